pub mod cluster;
pub mod filter;
pub mod replicated;
pub mod sqlite;

use chrono::Utc;
use std::path::Path;

use crate::config::{AppConfig, StoreMode};
use crate::error::StoreError;
use crate::models::file::{DeleteFileResponse, FileId, FileInfo, UploadInfo};
use crate::models::query::ListFileMetadataRequest;

pub use cluster::{ClusterNode, ClusterStatus, HandoverRequest};
pub use filter::RecordStream;
pub use replicated::ReplicatedDatabase;
pub use sqlite::SqliteDatabase;

/// The store selected at startup.
pub enum FileStore {
    Replicated(ReplicatedDatabase),
    SingleNode(SqliteDatabase),
}

impl FileStore {
    /// Create the data directory, connect, and make sure the schema exists.
    pub async fn open(config: &AppConfig) -> Result<Self, StoreError> {
        ensure_dir(&config.database_dir())?;

        let store = match config.store_mode {
            StoreMode::Replicated => FileStore::Replicated(ReplicatedDatabase::open(config).await?),
            StoreMode::SingleNode => FileStore::SingleNode(SqliteDatabase::open(config).await?),
        };
        store.create_schema().await?;

        tracing::info!(
            mode = ?config.store_mode,
            path = %config.database_path().display(),
            "File store opened"
        );
        Ok(store)
    }

    fn db(&self) -> &SqliteDatabase {
        match self {
            FileStore::Replicated(r) => &r.db,
            FileStore::SingleNode(db) => db,
        }
    }

    pub fn cluster(&self) -> Option<&ClusterNode> {
        match self {
            FileStore::Replicated(r) => Some(&r.node),
            FileStore::SingleNode(_) => None,
        }
    }

    pub async fn create_schema(&self) -> Result<(), StoreError> {
        self.db().create_schema().await
    }

    pub async fn save(&self, info: &UploadInfo, content: &[u8]) -> Result<FileId, StoreError> {
        self.db().save(info, content).await
    }

    pub async fn get(&self, provided_id: &str) -> Result<FileInfo, StoreError> {
        self.db().get(provided_id).await
    }

    pub async fn download(&self, provided_id: &str) -> Result<(FileInfo, Vec<u8>), StoreError> {
        self.db().download(provided_id).await
    }

    pub fn list(&self, request: &ListFileMetadataRequest) -> Result<RecordStream, StoreError> {
        self.db().list(request)
    }

    pub async fn soft_delete(&self, provided_id: &str) -> Result<DeleteFileResponse, StoreError> {
        self.soft_delete_at(provided_id, Utc::now().timestamp()).await
    }

    pub async fn soft_delete_at(
        &self,
        provided_id: &str,
        now: i64,
    ) -> Result<DeleteFileResponse, StoreError> {
        self.db().soft_delete_at(provided_id, now).await
    }

    pub async fn clean_tombstones(&self) -> Result<u64, StoreError> {
        self.clean_tombstones_at(Utc::now().timestamp()).await
    }

    pub async fn clean_tombstones_at(&self, now: i64) -> Result<u64, StoreError> {
        self.db().clean_tombstones_at(now).await
    }

    pub async fn record_count(&self) -> Result<u64, StoreError> {
        self.db().record_count().await
    }

    pub async fn close(&self) -> Result<(), StoreError> {
        match self {
            FileStore::Replicated(r) => r.close().await,
            FileStore::SingleNode(db) => {
                db.close().await;
                Ok(())
            }
        }
    }
}

fn ensure_dir(path: &Path) -> Result<(), StoreError> {
    std::fs::create_dir_all(path).map_err(|source| StoreError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}
