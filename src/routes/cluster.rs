use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;
use crate::storage::{ClusterNode, HandoverRequest};

fn node(state: &AppState) -> Result<&ClusterNode, AppError> {
    state
        .store
        .cluster()
        .ok_or_else(|| AppError::Conflict("node is not a cluster member".into()))
}

pub async fn handover(
    State(state): State<AppState>,
    Json(request): Json<HandoverRequest>,
) -> Result<Json<Value>, AppError> {
    let node = node(&state)?;
    node.accept_leadership(&request.from);
    Ok(Json(json!({ "data": node.status(), "error": null })))
}

pub async fn status(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let node = node(&state)?;
    Ok(Json(json!({ "data": node.status(), "error": null })))
}
