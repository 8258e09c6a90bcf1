use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};

use crate::models::file::UploadInfo;

const LEN_PREFIX: usize = 4;

/// One unit of an upload stream. Each frame carries exactly one of a content
/// chunk or the metadata envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UploadFrame {
    Chunk(Vec<u8>),
    Info(UploadInfo),
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame payload could not be decoded: {0}")]
    Decode(#[from] bincode::Error),

    #[error("stream ended inside a frame ({0} trailing bytes)")]
    Truncated(usize),

    #[error("frame payload of {0} bytes does not fit a u32 length prefix")]
    TooLarge(usize),
}

/// Length-prefixed (`u32` little endian) bincode encoding of a frame.
pub fn encode_frame(frame: &UploadFrame) -> Result<Vec<u8>, FrameError> {
    let data = bincode::serialize(frame)?;
    let prefix = length_prefix(data.len())?;
    let mut out = Vec::with_capacity(LEN_PREFIX + data.len());
    out.extend_from_slice(&prefix);
    out.extend_from_slice(&data);
    Ok(out)
}

fn length_prefix(len: usize) -> Result<[u8; LEN_PREFIX], FrameError> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| FrameError::TooLarge(len))
}

/// Reassembles frames from arbitrarily split reads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns the next complete frame, or `None` if more input is needed.
    pub fn next_frame(&mut self) -> Result<Option<UploadFrame>, FrameError> {
        if self.buf.len() < LEN_PREFIX {
            return Ok(None);
        }
        let mut prefix = [0u8; LEN_PREFIX];
        prefix.copy_from_slice(&self.buf[..LEN_PREFIX]);
        let len = u32::from_le_bytes(prefix) as usize;
        if self.buf.len() < LEN_PREFIX + len {
            return Ok(None);
        }

        self.buf.advance(LEN_PREFIX);
        let payload = self.buf.split_to(len);
        let frame = bincode::deserialize::<UploadFrame>(&payload)?;
        Ok(Some(frame))
    }

    /// Call once the input has ended; leftover bytes mean a cut-off frame.
    pub fn finish(self) -> Result<(), FrameError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(FrameError::Truncated(self.buf.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::file::FileId;
    use std::collections::BTreeMap;

    fn info() -> UploadInfo {
        UploadInfo {
            file_id: FileId {
                id: "123hft".into(),
                name: "dummy".into(),
            },
            size: 10,
            compression: false,
            compression_type: String::new(),
            created_at: Some(1000),
            metadata: BTreeMap::from([("type".to_string(), "report".to_string())]),
        }
    }

    #[test]
    fn test_decoder_reassembles_split_frames() {
        let mut wire = encode_frame(&UploadFrame::Info(info())).unwrap();
        wire.extend(encode_frame(&UploadFrame::Chunk(b"hello".to_vec())).unwrap());

        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for byte in wire.chunks(3) {
            decoder.push(byte);
            while let Some(frame) = decoder.next_frame().unwrap() {
                frames.push(frame);
            }
        }
        decoder.finish().unwrap();

        assert_eq!(
            frames,
            vec![
                UploadFrame::Info(info()),
                UploadFrame::Chunk(b"hello".to_vec())
            ]
        );
    }

    #[test]
    fn test_decoder_reports_truncated_frame() {
        let wire = encode_frame(&UploadFrame::Chunk(vec![7; 32])).unwrap();
        let mut decoder = FrameDecoder::new();
        decoder.push(&wire[..wire.len() - 5]);
        assert!(decoder.next_frame().unwrap().is_none());
        assert!(matches!(
            decoder.finish(),
            Err(FrameError::Truncated(n)) if n == wire.len() - 5
        ));
    }

    #[test]
    fn test_decoder_rejects_garbage_payload() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&2u32.to_le_bytes());
        decoder.push(&[0xff, 0xff]);
        assert!(matches!(decoder.next_frame(), Err(FrameError::Decode(_))));
    }

    #[test]
    fn test_length_prefix_bounds() {
        assert_eq!(length_prefix(258).unwrap(), [2, 1, 0, 0]);
        assert_eq!(length_prefix(u32::MAX as usize).unwrap(), [0xff; 4]);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_oversized_payload_rejected() {
        let len = u32::MAX as usize + 1;
        assert!(matches!(length_prefix(len), Err(FrameError::TooLarge(n)) if n == len));
    }
}
