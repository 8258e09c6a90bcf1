pub mod cluster;
pub mod files;
pub mod health;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/cluster/handover", post(cluster::handover))
        .route("/cluster/status", get(cluster::status));

    let api_routes = Router::new()
        .route("/status", get(health::status))
        // Uploads are buffered by the session, not by the extractor.
        .route(
            "/files",
            post(files::upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route("/files/list", post(files::list_files))
        .route("/files/{file_id}", get(files::get_file))
        .route("/files/{file_id}", patch(files::update_file))
        .route("/files/{file_id}", delete(files::delete_file))
        .route("/files/{file_id}/content", get(files::download_file))
        .route("/tombstones/clean", post(files::clean_tombstones));

    let x_request_id = http::HeaderName::from_static("x-request-id");

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
