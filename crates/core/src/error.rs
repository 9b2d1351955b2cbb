//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid session ID: {0}")]
    InvalidSessionId(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
