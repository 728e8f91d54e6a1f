//! Error types for s3browser
//!
//! One error enum shared by the vault, the S3 services and the HTTP
//! surface. The transport layer maps each kind to a status code and a
//! stable wire code; services never format status codes themselves.

use thiserror::Error;

/// Common result type for s3browser operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for s3browser
#[derive(Debug, Error)]
pub enum Error {
    // Session / access control
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    // Request validation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Upstream store
    #[error("s3 error ({}): {message}", .code.as_deref().unwrap_or("unknown"))]
    S3 {
        code: Option<String>,
        message: String,
        request_id: Option<String>,
    },

    // Request lifecycle
    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out")]
    Timeout,

    // Internal
    #[error("internal error: {0}")]
    Internal(String),

    /// Fatal at startup: key mismatch, malformed salt, missing password,
    /// wrong file permissions.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create an unauthorized error
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a forbidden error
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an upstream store error without metadata
    pub fn s3(msg: impl Into<String>) -> Self {
        Self::S3 {
            code: None,
            message: msg.into(),
            request_id: None,
        }
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// HTTP status code for the API error envelope
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::InvalidInput(_) => 400,
            Self::S3 { .. } => 502,
            Self::Cancelled => 499,
            Self::Timeout => 504,
            // Configuration errors are fatal at startup; if one ever
            // reaches the transport layer it is an internal failure.
            Self::Internal(_) | Self::Configuration(_) => 500,
        }
    }

    /// Stable wire code for the API error envelope
    #[must_use]
    pub const fn api_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidInput(_) => "invalid_input",
            Self::S3 { .. } => "s3_error",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_http_status() {
        assert_eq!(Error::unauthorized("no session").http_status_code(), 401);
        assert_eq!(Error::forbidden("not bound").http_status_code(), 403);
        assert_eq!(Error::not_found("connection 9").http_status_code(), 404);
        assert_eq!(Error::conflict("name taken").http_status_code(), 409);
        assert_eq!(Error::invalid_input("bad key").http_status_code(), 400);
        assert_eq!(Error::s3("boom").http_status_code(), 502);
        assert_eq!(Error::Cancelled.http_status_code(), 499);
        assert_eq!(Error::Timeout.http_status_code(), 504);
        assert_eq!(Error::internal("bug").http_status_code(), 500);
    }

    #[test]
    fn test_error_api_code() {
        assert_eq!(Error::conflict("x").api_code(), "conflict");
        assert_eq!(Error::Timeout.api_code(), "timeout");
        assert_eq!(
            Error::configuration("key mismatch").api_code(),
            "configuration_error"
        );
    }

    #[test]
    fn test_s3_error_display_includes_code() {
        let err = Error::S3 {
            code: Some("NoSuchBucket".to_string()),
            message: "the bucket does not exist".to_string(),
            request_id: Some("req-1".to_string()),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("NoSuchBucket"));
        assert!(rendered.contains("does not exist"));
    }
}
