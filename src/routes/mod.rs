pub mod error;
pub mod health;
pub mod metrics;
pub mod processed;
pub mod tasks;
pub mod upscale;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Room for multipart boundaries and part headers on top of the image bytes.
const MULTIPART_OVERHEAD: usize = 16 * 1024;

/// Build the API router. The `/metrics` route is attached by the server binary.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/upscale", post(upscale::submit_upscale))
        .route("/tasks/{task_id}", get(tasks::get_task_status))
        .route("/processed/{task_id}", get(processed::download_result))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        // The multipart extractor's own 2 MB default is replaced by the configured
        // ceiling. The image itself is held to `max_upload_bytes` by the handler.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(
            body_limit.saturating_add(MULTIPART_OVERHEAD),
        ))
}
