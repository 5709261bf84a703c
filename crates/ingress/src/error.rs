//! Ingress error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// User-visible ingress failures.
///
/// Every variant renders as a structured JSON body `{"error": "..."}` with
/// the status code of its class; none of them ever reaches the dispatcher.
#[derive(Debug, Error)]
pub enum IngressError {
    /// Request body was not valid JSON for the expected envelope.
    #[error("Invalid request payload: {0}")]
    InvalidPayload(String),

    /// JSON-RPC method did not match the route.
    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    /// Empty `params` array.
    #[error("Missing params")]
    MissingParams,

    /// The request body could not be read from the connection.
    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    /// No `Authorization` header on a protected route.
    #[error("Authorization header required")]
    MissingAuth,

    /// Token failed verification or expired.
    #[error("Invalid token")]
    InvalidToken,

    /// Token valid but lacks a required role.
    #[error("Insufficient permissions")]
    Forbidden,

    /// Unknown user or wrong password at login.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Token could not be issued.
    #[error("Failed to generate token")]
    TokenGeneration,

    /// Per-client window exhausted.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Global window exhausted.
    #[error("Global rate limit exceeded")]
    GlobalRateLimited,
}

impl IngressError {
    fn status_code(&self) -> StatusCode {
        match self {
            IngressError::InvalidPayload(_)
            | IngressError::InvalidMethod(_)
            | IngressError::MissingParams => StatusCode::BAD_REQUEST,
            IngressError::BodyRead(_) | IngressError::TokenGeneration => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            IngressError::MissingAuth
            | IngressError::InvalidToken
            | IngressError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            IngressError::Forbidden => StatusCode::FORBIDDEN,
            IngressError::RateLimited | IngressError::GlobalRateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
