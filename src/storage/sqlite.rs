use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::filter::{self, RecordStream};
use crate::config::AppConfig;
use crate::error::StoreError;
use crate::models::file::{DeleteFileResponse, FileId, FileInfo, MetadataRow, UploadInfo};
use crate::models::query::ListFileMetadataRequest;

const LIST_BUFFER: usize = 64;

/// Tables are created parent first; each statement is tagged with its model.
const SCHEMA: &[(&str, &str)] = &[
    (
        "File",
        "CREATE TABLE IF NOT EXISTS file (
            id      TEXT PRIMARY KEY,
            content BLOB NOT NULL
        )",
    ),
    (
        "Metadata",
        "CREATE TABLE IF NOT EXISTS metadata (
            id                     TEXT PRIMARY KEY,
            provided_id            TEXT NOT NULL,
            provided_name          TEXT NOT NULL,
            size                   INTEGER NOT NULL,
            compression            INTEGER NOT NULL DEFAULT 0,
            compression_type       TEXT NOT NULL DEFAULT '',
            clean_tombstone_set_at INTEGER,
            created_at             INTEGER NOT NULL,
            deleted_at             INTEGER,
            file_id                TEXT NOT NULL REFERENCES file(id) ON DELETE CASCADE
        )",
    ),
    (
        "Metadata",
        "CREATE INDEX IF NOT EXISTS idx_metadata_provided_id ON metadata(provided_id)",
    ),
    (
        "Metadata",
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_metadata_live_provided_id
            ON metadata(provided_id) WHERE deleted_at IS NULL",
    ),
    (
        "Metadata",
        "CREATE INDEX IF NOT EXISTS idx_metadata_tombstone
            ON metadata(clean_tombstone_set_at) WHERE deleted_at IS NOT NULL",
    ),
    (
        "MetadataEntry",
        "CREATE TABLE IF NOT EXISTS metadata_entry (
            id          TEXT PRIMARY KEY,
            metadata_id TEXT NOT NULL REFERENCES metadata(id) ON DELETE CASCADE,
            key         TEXT NOT NULL,
            value       TEXT NOT NULL
        )",
    ),
    (
        "MetadataEntry",
        "CREATE INDEX IF NOT EXISTS idx_metadata_entry_key ON metadata_entry(key)",
    ),
    (
        "MetadataEntry",
        "CREATE INDEX IF NOT EXISTS idx_metadata_entry_metadata_id ON metadata_entry(metadata_id)",
    ),
];

const SELECT_METADATA: &str = "SELECT id, provided_id, provided_name, size, compression, \
     compression_type, clean_tombstone_set_at, created_at, deleted_at, file_id \
     FROM metadata WHERE provided_id = ? AND deleted_at IS NULL";

/// Relational core shared by both store variants.
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
    tombstone_grace_secs: i64,
}

impl SqliteDatabase {
    pub async fn open(config: &AppConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(config.database_path())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_db_connections.max(1))
            .connect_with(options)
            .await
            .map_err(StoreError::Connect)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(StoreError::Connect)?;

        Ok(Self {
            pool,
            tombstone_grace_secs: config.tombstone_grace_secs,
        })
    }

    pub async fn create_schema(&self) -> Result<(), StoreError> {
        for &(model, statement) in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|source| {
                    tracing::error!(model = %model, error = %source, "Error during model creation");
                    StoreError::Migration { model, source }
                })?;
        }
        Ok(())
    }

    /// Persist a file and its metadata entries in one transaction.
    ///
    /// The stored size is the length of `content`.
    pub async fn save(&self, info: &UploadInfo, content: &[u8]) -> Result<FileId, StoreError> {
        let file_row_id = Uuid::new_v4().to_string();
        let metadata_id = Uuid::new_v4().to_string();
        let created_at = info.created_at.unwrap_or_else(|| Utc::now().timestamp());
        let provided_id = info.file_id.id.as_str();

        let mut tx = self.pool.begin().await.map_err(StoreError::WriteFailed)?;

        sqlx::query("INSERT INTO file (id, content) VALUES (?, ?)")
            .bind(&file_row_id)
            .bind(content)
            .execute(&mut *tx)
            .await
            .map_err(|e| write_error(e, provided_id))?;

        sqlx::query(
            "INSERT INTO metadata (id, provided_id, provided_name, size, compression, \
             compression_type, clean_tombstone_set_at, created_at, deleted_at, file_id) \
             VALUES (?, ?, ?, ?, ?, ?, NULL, ?, NULL, ?)",
        )
        .bind(&metadata_id)
        .bind(provided_id)
        .bind(&info.file_id.name)
        .bind(content.len() as i64)
        .bind(info.compression)
        .bind(&info.compression_type)
        .bind(created_at)
        .bind(&file_row_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, provided_id))?;

        for (key, value) in &info.metadata {
            sqlx::query(
                "INSERT INTO metadata_entry (id, metadata_id, key, value) VALUES (?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&metadata_id)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(|e| write_error(e, provided_id))?;
        }

        tx.commit().await.map_err(StoreError::WriteFailed)?;

        tracing::info!(
            file_id = %provided_id,
            record_id = %metadata_id,
            size = content.len(),
            "File saved"
        );

        Ok(info.file_id.clone())
    }

    pub async fn get(&self, provided_id: &str) -> Result<FileInfo, StoreError> {
        let row = self.live_row(provided_id).await?;
        let entries = self.entries(&row.id).await?;
        Ok(row.into_file_info(entries))
    }

    pub async fn download(&self, provided_id: &str) -> Result<(FileInfo, Vec<u8>), StoreError> {
        let row = self.live_row(provided_id).await?;
        let content: Vec<u8> = sqlx::query_scalar("SELECT content FROM file WHERE id = ?")
            .bind(&row.file_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(provided_id.to_string()))?;
        let entries = self.entries(&row.id).await?;
        Ok((row.into_file_info(entries), content))
    }

    async fn live_row(&self, provided_id: &str) -> Result<MetadataRow, StoreError> {
        sqlx::query_as::<_, MetadataRow>(SELECT_METADATA)
            .bind(provided_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(provided_id.to_string()))
    }

    async fn entries(&self, metadata_id: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM metadata_entry WHERE metadata_id = ?")
                .bind(metadata_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }

    /// Validate and run a list query; records arrive on the returned stream.
    pub fn list(&self, request: &ListFileMetadataRequest) -> Result<RecordStream, StoreError> {
        let builder = filter::build_list_query(request)?;
        let (tx, rx) = mpsc::channel(LIST_BUFFER);
        tokio::spawn(filter::stream_records(self.pool.clone(), builder, tx));
        Ok(RecordStream::new(rx))
    }

    /// Mark the live record deleted and start its grace period.
    pub async fn soft_delete_at(
        &self,
        provided_id: &str,
        now: i64,
    ) -> Result<DeleteFileResponse, StoreError> {
        let purge_after = now + self.tombstone_grace_secs.max(0);
        let result = sqlx::query(
            "UPDATE metadata SET deleted_at = ?, clean_tombstone_set_at = ? \
             WHERE provided_id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(purge_after)
        .bind(provided_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(provided_id.to_string()));
        }

        Ok(DeleteFileResponse {
            file_id: provided_id.to_string(),
            deleted_at: now,
            purge_after,
        })
    }

    /// Permanently remove tombstoned records whose grace deadline has passed.
    pub async fn clean_tombstones_at(&self, now: i64) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let expired: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, file_id FROM metadata \
             WHERE deleted_at IS NOT NULL \
               AND clean_tombstone_set_at IS NOT NULL \
               AND clean_tombstone_set_at <= ?",
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        for (metadata_id, file_id) in &expired {
            sqlx::query("DELETE FROM metadata_entry WHERE metadata_id = ?")
                .bind(metadata_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM metadata WHERE id = ?")
                .bind(metadata_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM file WHERE id = ?")
                .bind(file_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(expired.len() as u64)
    }

    pub async fn record_count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metadata WHERE deleted_at IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn write_error(err: sqlx::Error, provided_id: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(provided_id.to_string())
        }
        _ => {
            tracing::error!(file_id = %provided_id, error = %err, "Failed to save model");
            StoreError::WriteFailed(err)
        }
    }
}
