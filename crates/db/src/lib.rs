//! Database access layer for the Attest server.
//!
//! This crate provides the connection-handling core:
//! - A bounded connection pool behind an explicit [`Database`] handle
//! - Request-scoped connection sessions with implicit transactions
//! - A generic parameterized query executor with uniform error handling
//! - The audit log repository built on top of the executor

pub mod audit;
pub mod error;
pub mod pool;
pub mod session;
pub mod value;

pub use audit::{AuditEntry, AuditLog};
pub use error::{DbError, DbResult};
pub use pool::Database;
pub use session::{DbSession, Fetch, QueryOutcome};
pub use value::{Row, SqlParam, SqlValue};
