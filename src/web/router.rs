//! Router configuration for the HTTP transport.

use axum::{extract::DefaultBodyLimit, routing::get, routing::post, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{download_file, get_file_info, upload_file, AppState};
use super::middleware::create_cors_layer;

/// Headroom on top of the largest upload for multipart framing.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the main API router.
pub fn create_router(app_state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let body_limit = usize::try_from(app_state.service.max_file_size())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let file_routes = Router::new()
        .route("/", post(upload_file))
        .route("/:id", get(download_file))
        .route("/:id/info", get(get_file_info))
        .layer(DefaultBodyLimit::max(body_limit));

    let api_routes = Router::new().nest("/files", file_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins)),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
