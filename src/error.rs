use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::path::PathBuf;

use crate::protocol::frame::FrameError;
use crate::query::QueryError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("can't create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cluster bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("failed to open database connection: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("error during creation of {model} model: {source}")]
    Migration {
        model: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to save file in database: {0}")]
    WriteFailed(#[source] sqlx::Error),

    #[error("file with id {0} already exists")]
    Duplicate(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("leadership handover failed: {0}")]
    Handover(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("stream ended without a metadata envelope")]
    MissingMetadata,

    #[error("metadata envelope received more than once")]
    DuplicateMetadata,

    #[error("malformed upload stream: {0}")]
    Frame(#[from] FrameError),

    #[error("error while processing stream, details: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Not implemented: {0}")]
    Unimplemented(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Store(e) => match e {
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::Duplicate(_) => StatusCode::CONFLICT,
                StoreError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Upload(_) | AppError::Query(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Conflict(msg) | AppError::Unimplemented(msg) => msg.clone(),
            other => other.to_string(),
        };

        tracing::error!(status = %status, error = %message);

        let body = json!({
            "data": null,
            "error": {
                "code": status.as_u16(),
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
