//! Error types for the Tollgate service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A configuration value was loaded but is out of range
    #[error("Invalid setting `{key}`: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;

/// Errors surfaced to HTTP callers.
///
/// Each variant maps to a status code and a machine-readable `error` kind in
/// the JSON body.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Quota exhausted for the caller's identity
    #[error("rate limited")]
    RateLimited,

    /// Request body was not valid JSON
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    /// No route matched
    #[error("route not found")]
    NotFound,

    /// Anything unexpected; the detail is logged, never returned
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: &'static str,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::RateLimited => "rate_limited",
            ApiError::InvalidJson(_) => "invalid_json",
            ApiError::NotFound => "not_found",
            ApiError::Internal(_) => "internal_server_error",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            ApiError::RateLimited => "Too many requests, please try again later.",
            ApiError::InvalidJson(_) => "The request body is not valid JSON.",
            ApiError::NotFound => "The requested resource was not found.",
            ApiError::Internal(_) => "Something went wrong on our end.",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref detail) = self {
            error!(error = %detail, "Request failed");
        }

        let body = ErrorBody {
            error: self.kind(),
            message: self.message(),
        };
        (self.status(), Json(body)).into_response()
    }
}
