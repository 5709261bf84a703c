//! Liveness endpoint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Handler for `GET /sequencer/health`.
pub async fn handle_health() -> Response {
    if is_healthy() {
        (StatusCode::OK, "Service is healthy").into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Service is not healthy").into_response()
    }
}

// TODO: report degraded once the dispatcher exposes merger connectivity.
fn is_healthy() -> bool {
    true
}
