//! # Outbound HTTP Errors

use thiserror::Error;

/// Result type for outbound requests
pub type HttpResult<T> = Result<T, HttpError>;

/// Outbound HTTP errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("failed to read response: {0}")]
    Body(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}
