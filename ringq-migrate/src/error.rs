//! Error types for ringq-migrate
//!
//! [`RelayError`] covers the relay and run controller; [`ApiError`] maps
//! failures of the local HTTP surface onto JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Relay and controller errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// Connection failure, non-2xx status, read error or deadline expiry
    #[error("Transport error: {0}")]
    Transport(String),

    /// Stream ended with an unterminated frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Backend reported an error inside the stream
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Run cancelled by the user
    #[error("cancelled")]
    Cancelled,

    /// A run is already active (concurrent starts are rejected)
    #[error("Migration run already in progress: {0}")]
    RunInProgress(uuid::Uuid),

    /// Cancel/wait requested with no active run
    #[error("No migration run is active")]
    NoActiveRun,

    /// Invalid relay configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// ringq-common error
    #[error("Common error: {0}")]
    Common(#[from] ringq_common::Error),
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Transport(format!("deadline exceeded: {}", err))
        } else {
            RelayError::Transport(err.to_string())
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Transport(err.to_string())
    }
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - a migration run is already active
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::RunInProgress(_) => ApiError::Conflict(err.to_string()),
            RelayError::NoActiveRun => ApiError::NotFound(err.to_string()),
            RelayError::Config(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_error_to_api_error_mapping() {
        let conflict: ApiError = RelayError::RunInProgress(uuid::Uuid::nil()).into();
        assert!(matches!(conflict, ApiError::Conflict(_)));

        let missing: ApiError = RelayError::NoActiveRun.into();
        assert!(matches!(missing, ApiError::NotFound(_)));

        let internal: ApiError = RelayError::Transport("boom".to_string()).into();
        assert!(matches!(internal, ApiError::Internal(_)));
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::Conflict("x".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_cancelled_message() {
        assert_eq!(RelayError::Cancelled.to_string(), "cancelled");
    }
}
