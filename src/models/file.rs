use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Caller supplied identity of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileId {
    pub id: String,
    pub name: String,
}

/// Metadata envelope sent once per upload stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadInfo {
    pub file_id: FileId,
    /// Size declared by the uploader; the stored size is what was received.
    pub size: u64,
    pub compression: bool,
    pub compression_type: String,
    /// Timestamp of the file itself, epoch seconds.
    pub created_at: Option<i64>,
    pub metadata: BTreeMap<String, String>,
}

/// A stored file as seen by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_id: FileId,
    pub size: u64,
    pub compression: bool,
    pub compression_type: String,
    pub created_at: i64,
    pub deleted_at: Option<i64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadFileResponse {
    pub file_id: FileId,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteFileResponse {
    pub file_id: String,
    pub deleted_at: i64,
    pub purge_after: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanTombstonesResponse {
    pub purged: u64,
}

/// Row of the `metadata` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MetadataRow {
    pub id: String,
    pub provided_id: String,
    pub provided_name: String,
    pub size: i64,
    pub compression: bool,
    pub compression_type: String,
    pub clean_tombstone_set_at: Option<i64>,
    pub created_at: i64,
    pub deleted_at: Option<i64>,
    pub file_id: String,
}

impl MetadataRow {
    pub fn into_file_info(self, metadata: BTreeMap<String, String>) -> FileInfo {
        FileInfo {
            file_id: FileId {
                id: self.provided_id,
                name: self.provided_name,
            },
            size: self.size.max(0) as u64,
            compression: self.compression,
            compression_type: self.compression_type,
            created_at: self.created_at,
            deleted_at: self.deleted_at,
            metadata,
        }
    }
}
