// HTTP routes
pub mod clients;
pub mod credentials;
pub mod graph;
pub mod health;
pub mod jobs;
pub mod prechecks;
pub mod settings;
pub mod stream;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

/// Standard error body: `{"error": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn error_response(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// 500 with the error text, logged.
pub fn internal_error(err: impl std::fmt::Display) -> (StatusCode, Json<ErrorBody>) {
    tracing::error!(error = %err, "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
