//! Error types for claimcheck
//!
//! Two layers:
//! - `CallError`: a single downstream call (search API, LLM, page fetch)
//!   failed. Carries an `ErrorClass` the retry executor acts on.
//! - `AppError`: what surfaces to a caller of the pipeline or the HTTP API.
//!   Per-item call failures never become an `AppError`; they degrade to
//!   sentinel results instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Classification of a failed downstream call
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// HTTP 429
    RateLimited,
    /// 5xx, timeouts, connection resets, disconnects
    Transient,
    /// 401 / 403
    AuthFailure,
    /// Any other 4xx, malformed requests, local gateway timeouts
    Fatal,
    /// Model output missing required keys or not JSON
    ResponseShapeInvalid,
}

impl ErrorClass {
    /// Whether the network-level retry loop should try again
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::RateLimited | ErrorClass::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::Transient => "transient",
            ErrorClass::AuthFailure => "auth_failure",
            ErrorClass::Fatal => "fatal",
            ErrorClass::ResponseShapeInvalid => "response_shape_invalid",
        }
    }
}

/// Failure of one downstream call
#[derive(Error, Debug, Clone)]
pub enum CallError {
    #[error("Rate limited by upstream: {message}")]
    RateLimited { message: String },

    #[error("Transient upstream failure: {message}")]
    Transient { message: String },

    #[error("Authentication rejected with status {status}: {message}")]
    Auth { status: u16, message: String },

    #[error("Request rejected: {message}")]
    Fatal { message: String },

    #[error("Invalid response shape: {message}")]
    ResponseShapeInvalid { message: String },

    #[error("Rate window still full after waiting {waited_ms}ms")]
    RateLimitTimeout { waited_ms: u64 },
}

impl CallError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CallError::RateLimited { .. } => ErrorClass::RateLimited,
            CallError::Transient { .. } => ErrorClass::Transient,
            CallError::Auth { .. } => ErrorClass::AuthFailure,
            CallError::Fatal { .. } | CallError::RateLimitTimeout { .. } => ErrorClass::Fatal,
            CallError::ResponseShapeInvalid { .. } => ErrorClass::ResponseShapeInvalid,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        CallError::Transient { message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        CallError::Fatal { message: message.into() }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        CallError::ResponseShapeInvalid { message: message.into() }
    }

    /// Map a non-success HTTP status to a call error
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 200));
        match status.as_u16() {
            429 => CallError::RateLimited { message },
            401 | 403 => CallError::Auth {
                status: status.as_u16(),
                message,
            },
            s if s >= 500 => CallError::Transient { message },
            _ => CallError::Fatal { message },
        }
    }
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return CallError::from_status(status, &err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            CallError::Transient { message: err.to_string() }
        } else if err.is_decode() {
            CallError::ResponseShapeInvalid { message: err.to_string() }
        } else {
            CallError::Fatal { message: err.to_string() }
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    PayloadTooLarge,

    // Rate limiting (6xxx)
    RateLimited,

    // External service errors (8xxx)
    UpstreamError,
    UpstreamAuth,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
    AggregateMismatch,
    Cancelled,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::PayloadTooLarge => 1004,
            ErrorCode::RateLimited => 6001,
            ErrorCode::UpstreamError => 8001,
            ErrorCode::UpstreamAuth => 8002,
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
            ErrorCode::AggregateMismatch => 9004,
            ErrorCode::Cancelled => 9005,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Payload too large: {size} chars exceeds limit of {limit} chars")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    /// Dispatcher produced a result list that does not line up with the
    /// flattened query list. Never recovered.
    #[error("Evidence aggregation mismatch: {expected} queries but {actual} result lists")]
    AggregateMismatch { expected: usize, actual: usize },

    #[error("Upstream call failed: {0}")]
    Upstream(#[from] CallError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Operation cancelled: {message}")]
    Cancelled { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::AggregateMismatch { .. } => ErrorCode::AggregateMismatch,
            AppError::Upstream(CallError::Auth { .. }) => ErrorCode::UpstreamAuth,
            AppError::Upstream(_) | AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Cancelled { .. } => ErrorCode::Cancelled,
            AppError::Internal { .. } | AppError::Other(_) => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(_) | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::AggregateMismatch { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let too_many = CallError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(too_many.class(), ErrorClass::RateLimited);

        let unavailable = CallError::from_status(reqwest::StatusCode::SERVICE_UNAVAILABLE, "down");
        assert_eq!(unavailable.class(), ErrorClass::Transient);

        let unauthorized = CallError::from_status(reqwest::StatusCode::UNAUTHORIZED, "bad key");
        assert_eq!(unauthorized.class(), ErrorClass::AuthFailure);

        let forbidden = CallError::from_status(reqwest::StatusCode::FORBIDDEN, "");
        assert_eq!(forbidden.class(), ErrorClass::AuthFailure);

        let bad_request = CallError::from_status(reqwest::StatusCode::BAD_REQUEST, "");
        assert_eq!(bad_request.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_retryable_classes() {
        assert!(ErrorClass::RateLimited.is_retryable());
        assert!(ErrorClass::Transient.is_retryable());
        assert!(!ErrorClass::AuthFailure.is_retryable());
        assert!(!ErrorClass::Fatal.is_retryable());
        assert!(!ErrorClass::ResponseShapeInvalid.is_retryable());
    }

    #[test]
    fn test_gateway_timeout_is_not_retried() {
        let err = CallError::RateLimitTimeout { waited_ms: 5000 };
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_aggregate_mismatch_is_server_error() {
        let err = AppError::AggregateMismatch { expected: 3, actual: 2 };
        assert_eq!(err.code(), ErrorCode::AggregateMismatch);
        assert!(err.is_server_error());
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "text must not be empty".into(),
            field: Some("text".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.is_client_error());
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(500);
        let err = CallError::from_status(reqwest::StatusCode::BAD_REQUEST, &body);
        assert!(err.to_string().len() < 300);
    }
}
