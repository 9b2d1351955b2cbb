//! Database layer error types.

use thiserror::Error;

/// Database layer errors.
///
/// Connectivity failures propagate the driver error unmodified; statement
/// failures are wrapped into the generic [`DbError::Query`] so callers never
/// branch on driver-specific error types.
#[derive(Debug, Error)]
pub enum DbError {
    /// Pool construction or connectivity failure. Not retried here.
    #[error("database connection failed: {0}")]
    Connect(sqlx::Error),

    /// Checking a connection out of the pool failed (closed pool or
    /// checkout wait exceeded).
    #[error("connection checkout failed: {0}")]
    Checkout(sqlx::Error),

    /// A statement failed. The driver's message text is preserved but the
    /// original error type is not exposed.
    #[error("database operation failed: {0}")]
    Query(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for database operations.
pub type DbResult<T> = std::result::Result<T, DbError>;
