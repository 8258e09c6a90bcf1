use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use std::convert::Infallible;

use crate::error::AppError;
use crate::models::file::{CleanTombstonesResponse, DeleteFileResponse, FileInfo};
use crate::models::query::{ListFileMetadataRequest, ListFileMetadataResponse};
use crate::storage::{FileStore, RecordStream};

pub async fn get_file(store: &FileStore, file_id: &str) -> Result<FileInfo, AppError> {
    Ok(store.get(file_id).await?)
}

/// Content of a live file plus its SHA-256 hex digest.
pub async fn download_file(
    store: &FileStore,
    file_id: &str,
) -> Result<(FileInfo, Vec<u8>, String), AppError> {
    let (info, content) = store.download(file_id).await?;

    let mut hasher = Sha256::new();
    hasher.update(&content);
    let etag = hex::encode(hasher.finalize());

    Ok((info, content, etag))
}

/// Split content into body chunks of at most `chunk_size` bytes.
pub fn content_chunks(
    content: Vec<u8>,
    chunk_size: usize,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    let mut content = Bytes::from(content);
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(content.len() / chunk_size + 1);
    while !content.is_empty() {
        let n = chunk_size.min(content.len());
        chunks.push(Ok(content.split_to(n)));
    }
    futures_util::stream::iter(chunks)
}

pub async fn delete_file(store: &FileStore, file_id: &str) -> Result<DeleteFileResponse, AppError> {
    let deleted = store.soft_delete(file_id).await?;
    tracing::info!(
        file_id = %file_id,
        purge_after = deleted.purge_after,
        "File marked deleted"
    );
    Ok(deleted)
}

pub async fn clean_tombstones(store: &FileStore) -> Result<CleanTombstonesResponse, AppError> {
    let purged = store.clean_tombstones().await?;
    if purged > 0 {
        tracing::info!(count = purged, "Tombstones purged");
    }
    Ok(CleanTombstonesResponse { purged })
}

/// Validate the request and start the query. Errors here happen before any
/// response bytes are written.
pub fn list_files(
    store: &FileStore,
    request: &ListFileMetadataRequest,
) -> Result<RecordStream, AppError> {
    tracing::debug!(
        filters = request.filter_by.len(),
        sorts = request.sort_by.len(),
        "Listing file metadata"
    );
    Ok(store.list(request)?)
}

/// Encode each record as one NDJSON line. A failure mid-stream becomes a
/// final error line.
pub fn result_lines(records: RecordStream) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    records.into_stream().map(|item| {
        let message = match item {
            Ok(info) => ListFileMetadataResponse::Results(info),
            Err(e) => ListFileMetadataResponse::Error {
                message: e.to_string(),
            },
        };
        Ok(encode_line(&message))
    })
}

fn encode_line(message: &ListFileMetadataResponse) -> Bytes {
    match serde_json::to_vec(message) {
        Ok(mut line) => {
            line.push(b'\n');
            Bytes::from(line)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode list response");
            Bytes::from(format!(
                "{{\"error\":{{\"message\":\"failed to encode record: {}\"}}}}\n",
                e.to_string().replace('"', "'")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_content_chunks_respect_size() {
        let chunks: Vec<Bytes> = content_chunks(b"abcdefghij".to_vec(), 4)
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec![Bytes::from("abcd"), Bytes::from("efgh"), Bytes::from("ij")]);
    }

    #[tokio::test]
    async fn test_empty_content_has_no_chunks() {
        let chunks: Vec<_> = content_chunks(Vec::new(), 4).collect().await;
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_encode_line_is_newline_terminated() {
        let line = encode_line(&ListFileMetadataResponse::Error {
            message: "gone".into(),
        });
        assert_eq!(&line[..], b"{\"error\":{\"message\":\"gone\"}}\n");
    }
}
