//! API error types.

use thiserror::Error;

/// Errors returned by control-plane operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The addressed object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The API answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        error_code: Option<String>,
        message: String,
    },

    /// The request never produced a response (connect, TLS, timeout).
    #[error("transport: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("decode: {0}")]
    Decode(String),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Whether this failure means the object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    /// Conflict with an existing object (name collisions).
    pub fn already_exists(what: &str, name: &str) -> Self {
        ApiError::Status {
            status: 400,
            error_code: Some("ObjectAlreadyExists".to_string()),
            message: format!("already exists: {} \"{}\"", what, name),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        ApiError::Status {
            status: 400,
            error_code: Some("InvalidRequest".to_string()),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if e.is_builder() {
            ApiError::InvalidRequest(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// Result type for control-plane operations.
pub type Result<T> = std::result::Result<T, ApiError>;
