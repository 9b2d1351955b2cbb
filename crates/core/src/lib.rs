//! Core domain types for the Attest evidence upload server.
//!
//! This crate defines the data model shared across all other crates:
//! - Upload session identifiers and lifecycle
//! - Filename sanitization for user-supplied names
//! - MIME sniffing policy for assembled files
//! - Application configuration

pub mod config;
pub mod error;
pub mod filename;
pub mod session;
pub mod sniff;

pub use config::{AppConfig, DatabaseConfig, ServerConfig, UploadConfig};
pub use error::{Error, Result};
pub use filename::sanitize_filename;
pub use session::{SessionId, SessionMetadata, SessionState};
pub use sniff::MimePolicy;

/// Default chunk size handed to clients: 2 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 2 * 1024 * 1024;

/// Maximum accepted chunk size: 16 MiB.
pub const MAX_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// Number of leading bytes examined for magic-number MIME detection.
pub const SNIFF_LEN: usize = 8192;
