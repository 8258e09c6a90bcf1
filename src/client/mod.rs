//! HTTP client for the file service.

pub mod output;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt::Display;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};
use tokio_util::io::ReaderStream;

use crate::models::file::{FileInfo, UploadFileResponse, UploadInfo};
use crate::models::query::{ListFileMetadataRequest, ListFileMetadataResponse};
use crate::protocol::frame::{encode_frame, FrameError, UploadFrame};
use crate::query::QueryError;

const API_PREFIX: &str = "/api/v1";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("server error: {0}")]
    Remote(String),

    #[error("error while processing stream, details: {0}")]
    Transport(String),

    #[error("stream ended in the middle of a record")]
    Truncated,

    #[error("undecodable response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub chunk_size: usize,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            server_url: std::env::var("AIRGAP_SERVER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8080".into()),
            chunk_size: std::env::var("AIRGAP_CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(64 * 1024),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    chunk_size: usize,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            chunk_size: config.chunk_size.max(1),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    /// Upload one file as an envelope frame followed by content frames.
    pub async fn upload_stream<S>(
        &self,
        info: UploadInfo,
        chunks: S,
    ) -> Result<UploadFileResponse, ClientError>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static,
    {
        let head = encode_frame(&UploadFrame::Info(info))?;
        let frames = chunks.map(|chunk| -> Result<Vec<u8>, ClientError> {
            let chunk = chunk?;
            Ok(encode_frame(&UploadFrame::Chunk(chunk.to_vec()))?)
        });
        let body = stream::once(async move { Ok::<_, ClientError>(head) }).chain(frames);

        let resp = self
            .http
            .post(self.url("/files"))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await?;

        read_data(resp).await
    }

    /// Upload a file from disk. The declared size and, when absent, the
    /// creation time are taken from the file itself.
    pub async fn upload_file(
        &self,
        path: &Path,
        mut info: UploadInfo,
    ) -> Result<UploadFileResponse, ClientError> {
        let file = tokio::fs::File::open(path).await?;
        let meta = file.metadata().await?;
        info.size = meta.len();
        if info.created_at.is_none() {
            info.created_at = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64);
        }

        tracing::debug!(path = %path.display(), size = info.size, "Uploading file");
        let chunks = ReaderStream::with_capacity(file, self.chunk_size);
        self.upload_stream(info, chunks).await
    }

    pub async fn get_file(&self, file_id: &str) -> Result<FileInfo, ClientError> {
        let resp = self
            .http
            .get(self.url(&format!("/files/{}", file_id)))
            .send()
            .await?;
        read_data(resp).await
    }

    /// Start a list query. Rejections (bad filters, unknown sort keys)
    /// surface here; records are pulled from the returned stream.
    pub async fn list_file_metadata(
        &self,
        request: &ListFileMetadataRequest,
    ) -> Result<ListStream, ClientError> {
        let resp = self
            .http
            .post(self.url("/files/list"))
            .json(request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        Ok(ListStream::new(resp.bytes_stream()))
    }
}

async fn read_data<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    if !resp.status().is_success() {
        return Err(status_error(resp).await);
    }
    let bytes = resp.bytes().await?;
    let envelope: Envelope<T> = serde_json::from_slice(&bytes).map_err(ClientError::Decode)?;
    match (envelope.data, envelope.error) {
        (Some(data), _) => Ok(data),
        (None, Some(err)) => Err(ClientError::Status {
            code: err.code,
            message: err.message,
        }),
        (None, None) => Err(ClientError::Remote("response carried no data".into())),
    }
}

async fn status_error(resp: reqwest::Response) -> ClientError {
    let code = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Envelope<serde_json::Value>>(&text)
        .ok()
        .and_then(|e| e.error)
        .map(|e| e.message)
        .unwrap_or(text);
    ClientError::Status { code, message }
}

/// Outcome of one pull from a [`ListStream`].
#[derive(Debug)]
pub enum StreamStep {
    Record(FileInfo),
    Done,
    Failure(ClientError),
}

/// Decodes an NDJSON list response one record at a time.
pub struct ListStream {
    inner: BoxStream<'static, Result<Bytes, ClientError>>,
    buf: BytesMut,
    input_ended: bool,
    terminated: bool,
}

impl ListStream {
    pub fn new<S, E>(body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display,
    {
        let inner = body
            .map(|chunk| chunk.map_err(|e| ClientError::Transport(e.to_string())))
            .boxed();
        Self {
            inner,
            buf: BytesMut::new(),
            input_ended: false,
            terminated: false,
        }
    }

    pub async fn next(&mut self) -> StreamStep {
        if self.terminated {
            return StreamStep::Done;
        }
        let step = self.pull().await;
        if !matches!(step, StreamStep::Record(_)) {
            self.terminated = true;
        }
        step
    }

    async fn pull(&mut self) -> StreamStep {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let line = self.buf.split_to(pos + 1);
                let line = line.trim_ascii();
                if line.is_empty() {
                    continue;
                }
                return decode_line(line);
            }

            if self.input_ended {
                return if self.buf.trim_ascii().is_empty() {
                    StreamStep::Done
                } else {
                    StreamStep::Failure(ClientError::Truncated)
                };
            }

            match self.inner.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => return StreamStep::Failure(e),
                None => self.input_ended = true,
            }
        }
    }
}

fn decode_line(line: &[u8]) -> StreamStep {
    match serde_json::from_slice::<ListFileMetadataResponse>(line) {
        Ok(ListFileMetadataResponse::Results(info)) => StreamStep::Record(info),
        Ok(ListFileMetadataResponse::Error { message }) => {
            StreamStep::Failure(ClientError::Remote(message))
        }
        Err(e) => StreamStep::Failure(ClientError::Decode(e)),
    }
}
