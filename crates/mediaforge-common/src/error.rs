//! Common error types used throughout mediaforge.
//!
//! This module provides a unified error type for descriptor validation and
//! registry lookups.

/// Common error type for mediaforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested stream was not found or has expired.
    #[error("Stream not found: {0}")]
    NotFound(String),

    /// The caller is not allowed to register streams.
    #[error("Unauthorized")]
    Unauthorized,

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input was provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new InvalidInput error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("abc");
        assert_eq!(err.to_string(), "Stream not found: abc");

        let err = Error::Unauthorized;
        assert_eq!(err.to_string(), "Unauthorized");

        let err = Error::invalid_input("expected 2 urls, got 3");
        assert_eq!(err.to_string(), "Invalid input: expected 2 urls, got 3");

        let err = Error::internal("unexpected state");
        assert_eq!(err.to_string(), "Internal error: unexpected state");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }
}
