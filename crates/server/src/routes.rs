//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Slack for query strings and framing on top of the raw chunk size.
const CHUNK_BODY_OVERHEAD: usize = 1024;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.upload.max_chunk_size as usize + CHUNK_BODY_OVERHEAD;

    Router::new()
        // Health check (intentionally unauthenticated for probes)
        .route("/api/health", get(handlers::health_check))
        // Upload session control plane
        .route("/api/uploads", post(handlers::create_session))
        .route("/api/uploads/{session_id}", get(handlers::session_status))
        .route(
            "/api/uploads/{session_id}/chunks/{chunk_index}",
            put(handlers::upload_chunk),
        )
        .route(
            "/api/uploads/{session_id}/complete",
            post(handlers::complete_upload),
        )
        .route(
            "/api/uploads/{session_id}/cancel",
            post(handlers::cancel_upload),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
