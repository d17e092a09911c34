//! API error types and HTTP response conversion
//!
//! Maps service errors onto status codes: validation problems are 422, state
//! conflicts (including the pinned-limit cap, which carries the currently
//! pinned ids) are 409, missing records are 404.

use crate::OrchestratorError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Ids currently pinned, present on pinned-limit conflicts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_pinned: Option<Vec<String>>,
}

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// Custom API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Validation error
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// State conflict (invalid transition, resume when not waiting, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Pinned cap reached; carries the current pinned ids
    #[error("Pinned limit exceeded")]
    PinnedLimit { current_pinned: Vec<String> },

    /// Internal server error
    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) | ApiError::PinnedLimit { .. } => StatusCode::CONFLICT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type name
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::Conflict(_) => "Conflict",
            ApiError::PinnedLimit { .. } => "PinnedLimitExceeded",
            ApiError::InternalError(_) => "InternalError",
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(error: OrchestratorError) -> Self {
        match error {
            OrchestratorError::NotFound(message) => ApiError::NotFound(message),
            OrchestratorError::Validation(message) => ApiError::ValidationError(message),
            OrchestratorError::StateConflict(message) => ApiError::Conflict(message),
            OrchestratorError::PinnedLimitExceeded { current_pinned } => {
                ApiError::PinnedLimit { current_pinned }
            }
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let current_pinned = match &self {
            ApiError::PinnedLimit { current_pinned } => Some(current_pinned.clone()),
            _ => None,
        };
        let body = ApiErrorResponse {
            error: self.error_type().to_string(),
            message: self.to_string(),
            current_pinned,
        };

        if status.is_server_error() {
            tracing::error!("API error: {:?}", body);
        }

        (status, Json(body)).into_response()
    }
}
