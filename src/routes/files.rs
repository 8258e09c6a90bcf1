use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::models::query::ListFileMetadataRequest;
use crate::services::{file_service, upload_service};
use crate::state::AppState;

const NDJSON: &str = "application/x-ndjson";

pub async fn upload_file(
    State(state): State<AppState>,
    body: Body,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let uploaded = upload_service::receive(&state.store, body.into_data_stream()).await?;

    tracing::info!(
        file_id = %uploaded.file_id.id,
        name = %uploaded.file_id.name,
        size = uploaded.size,
        "File uploaded"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "data": uploaded, "error": null })),
    ))
}

pub async fn list_files(
    State(state): State<AppState>,
    Json(request): Json<ListFileMetadataRequest>,
) -> Result<Response, AppError> {
    let records = file_service::list_files(&state.store, &request)?;
    let body = Body::from_stream(file_service::result_lines(records));
    Ok(([(header::CONTENT_TYPE, NDJSON)], body).into_response())
}

pub async fn get_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let info = file_service::get_file(&state.store, &file_id).await?;
    Ok(Json(json!({ "data": info, "error": null })))
}

pub async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let (info, content, etag) = file_service::download_file(&state.store, &file_id).await?;
    let quoted = format!("\"{}\"", etag);

    // Check If-None-Match
    if let Some(inm) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        if inm == quoted || inm == etag {
            return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, quoted)]).into_response());
        }
    }

    let length = content.len().to_string();
    let stream = file_service::content_chunks(content, state.config.download_chunk_size);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, length),
            (header::ETAG, quoted),
            (header::CACHE_CONTROL, "no-cache".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", info.file_id.name.replace('"', "")),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

pub async fn update_file(Path(file_id): Path<String>) -> Result<StatusCode, AppError> {
    Err(AppError::Unimplemented(format!(
        "metadata of {} cannot be changed after upload",
        file_id
    )))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let deleted = file_service::delete_file(&state.store, &file_id).await?;
    Ok(Json(json!({ "data": deleted, "error": null })))
}

pub async fn clean_tombstones(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let cleaned = file_service::clean_tombstones(&state.store).await?;
    Ok(Json(json!({ "data": cleaned, "error": null })))
}
