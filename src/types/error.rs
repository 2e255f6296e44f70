//! Error types for Keygate
//!
//! One taxonomy for the whole custody core. Credential and lookup failures
//! are deliberately generic at the API boundary so callers cannot tell a
//! wrong password from a tampered blob, or a wrong share from a missing
//! wallet.

use hyper::StatusCode;

/// Main error type for Keygate operations
#[derive(Debug, thiserror::Error)]
pub enum KeygateError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unsupported KDF version or malformed parameters. Fatal, not retryable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Wrong credential or failed authenticated decryption. Terminal per
    /// request; the message never says which check failed.
    #[error("Unlock failed")]
    Auth,

    /// No matching wallet or share. Indistinguishable from a wrong share at
    /// the API boundary to prevent enumeration.
    #[error("Not found")]
    NotFound,

    /// Reconstructed seed derived a public key that does not match the
    /// stored one. Treated as tamper or corruption, never retried.
    #[error("Integrity failure: {0}")]
    Integrity(String),

    /// Rotation precondition failed; stored state is untouched.
    #[error("Rotation rejected: {0}")]
    Rejected(String),

    /// KDF worker pool unavailable or saturated. The only "try again" class.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl KeygateError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Integrity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Rejected(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for HTTP error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Auth => "UNLOCK_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::Integrity(_) => "INTEGRITY_FAILURE",
            Self::Rejected(_) => "ROTATION_REJECTED",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for KeygateError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for KeygateError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for KeygateError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

/// Result type alias for Keygate operations
pub type Result<T> = std::result::Result<T, KeygateError>;
