//! Common types and utilities shared across threadline crates.
//!
//! This crate defines the shared error type and the observability helpers used
//! by every binary in the workspace. It is intentionally lightweight so that
//! the storage, queue and social crates can depend on it without pulling in
//! each other's drivers.
//!
//! # Overview
//!
//! - [`ThreadlineError`] and [`Result`]: shared error handling
//! - [`observability`]: centralised tracing/logging initialisation
//!
//! # Examples
//!
//! Classifying a failure before deciding whether to retry:
//!
//! ```rust
//! use threadline_common::ThreadlineError;
//!
//! let err = ThreadlineError::Upstream { status: 503, message: "busy".into() };
//! assert!(err.is_retryable());
//! assert!(!ThreadlineError::Decode("bad json".into()).is_retryable());
//! ```
pub mod observability;

/// Error types used across the threadline system.
#[derive(thiserror::Error, Debug)]
pub enum ThreadlineError {
    /// A network, broker or database connection failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The social-data API answered with a non-success status.
    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// A payload could not be decoded into the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied something unusable (bad id, blank field, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation exceeded the configured timeout.
    #[error("Timeout occurred")]
    Timeout,
}

impl ThreadlineError {
    /// Whether repeating the same call later could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ThreadlineError::Transport(_) | ThreadlineError::Timeout => true,
            ThreadlineError::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Convenient alias for results that use [`ThreadlineError`].
pub type Result<T> = std::result::Result<T, ThreadlineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_client_errors_are_final() {
        let err = ThreadlineError::Upstream {
            status: 404,
            message: "no such account".into(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Upstream returned 404: no such account");
    }

    #[test]
    fn rate_limits_and_transport_retry() {
        assert!(ThreadlineError::Upstream {
            status: 429,
            message: String::new()
        }
        .is_retryable());
        assert!(ThreadlineError::Transport("connection reset".into()).is_retryable());
        assert!(ThreadlineError::Timeout.is_retryable());
        assert!(!ThreadlineError::NotFound("user".into()).is_retryable());
    }
}
