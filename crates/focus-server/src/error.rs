//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use focus_core::{RuleSyncError, SessionError};
use serde::Serialize;
use thiserror::Error;

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Session lifecycle failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Network rule sync failure.
    #[error("rule sync failed: {0}")]
    Rules(#[from] RuleSyncError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] focus_storage::StorageError),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Session(e) => match e {
                SessionError::Validation(_) => (StatusCode::BAD_REQUEST, e.code()),
                SessionError::QuotaExceeded(_) => (StatusCode::FORBIDDEN, e.code()),
                SessionError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.code()),
            },
            ApiError::Rules(_) => (StatusCode::INTERNAL_SERVER_ERROR, "rule_sync_error"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
