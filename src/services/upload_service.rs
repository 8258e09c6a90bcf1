use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;

use crate::error::{AppError, UploadError};
use crate::models::file::{UploadFileResponse, UploadInfo};
use crate::protocol::frame::{FrameDecoder, UploadFrame};
use crate::storage::FileStore;

/// Content and envelope collected from one upload stream.
#[derive(Debug, Default)]
pub struct UploadSession {
    content: Vec<u8>,
    info: Option<UploadInfo>,
}

impl UploadSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, frame: UploadFrame) -> Result<(), UploadError> {
        match frame {
            UploadFrame::Chunk(chunk) => self.content.extend_from_slice(&chunk),
            UploadFrame::Info(info) => {
                if self.info.is_some() {
                    return Err(UploadError::DuplicateMetadata);
                }
                self.info = Some(info);
            }
        }
        Ok(())
    }

    pub fn received(&self) -> usize {
        self.content.len()
    }

    /// Close the session, yielding the envelope and the assembled content.
    pub fn finish(self) -> Result<(UploadInfo, Vec<u8>), UploadError> {
        let info = self.info.ok_or(UploadError::MissingMetadata)?;
        Ok((info, self.content))
    }
}

/// Drain a framed upload body and commit it as a single record.
///
/// Nothing is written unless the body ends cleanly with exactly one envelope.
pub async fn receive<S, E>(store: &FileStore, body: S) -> Result<UploadFileResponse, AppError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = FrameDecoder::new();
    let mut session = UploadSession::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| UploadError::Transport(e.to_string()))?;
        decoder.push(&chunk);
        while let Some(frame) = decoder.next_frame().map_err(UploadError::from)? {
            session.apply(frame)?;
        }
    }
    decoder.finish().map_err(UploadError::from)?;

    let (info, content) = session.finish()?;
    if info.size != content.len() as u64 {
        tracing::warn!(
            file_id = %info.file_id.id,
            declared = info.size,
            received = content.len(),
            "Declared size differs from received bytes"
        );
    }

    let file_id = store.save(&info, &content).await?;

    Ok(UploadFileResponse {
        file_id,
        size: content.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::file::FileId;
    use std::collections::BTreeMap;

    fn info(size: u64) -> UploadInfo {
        UploadInfo {
            file_id: FileId {
                id: "123hft".into(),
                name: "dummy".into(),
            },
            size,
            compression: false,
            compression_type: String::new(),
            created_at: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_missing_metadata() {
        let mut session = UploadSession::new();
        session.apply(UploadFrame::Chunk(b"abc".to_vec())).unwrap();
        assert!(matches!(session.finish(), Err(UploadError::MissingMetadata)));
    }

    #[test]
    fn test_second_envelope_rejected() {
        let mut session = UploadSession::new();
        session.apply(UploadFrame::Info(info(0))).unwrap();
        assert!(matches!(
            session.apply(UploadFrame::Info(info(0))),
            Err(UploadError::DuplicateMetadata)
        ));
    }

    #[test]
    fn test_envelope_position_does_not_affect_content() {
        let mut session = UploadSession::new();
        session.apply(UploadFrame::Chunk(b"0123".to_vec())).unwrap();
        session.apply(UploadFrame::Info(info(10))).unwrap();
        session.apply(UploadFrame::Chunk(b"456789".to_vec())).unwrap();
        assert_eq!(session.received(), 10);

        let (envelope, content) = session.finish().unwrap();
        assert_eq!(envelope.file_id.id, "123hft");
        assert_eq!(content, b"0123456789");
    }

    #[test]
    fn test_empty_content_is_allowed() {
        let mut session = UploadSession::new();
        session.apply(UploadFrame::Info(info(0))).unwrap();
        let (_, content) = session.finish().unwrap();
        assert!(content.is_empty());
    }
}
