//! Upload store error types.

use thiserror::Error;

/// Chunked upload errors.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload session not found: {0}")]
    SessionNotFound(String),

    #[error("upload session {session} is missing chunk {index}")]
    MissingChunk { session: String, index: u32 },

    #[error("upload session {0} is not complete")]
    AssemblyIncomplete(String),

    #[error("chunk index {index} out of range for {total} chunks")]
    InvalidChunkIndex { index: u32, total: u32 },

    #[error("session error: {0}")]
    Session(#[from] attest_core::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for upload store operations.
pub type UploadResult<T> = std::result::Result<T, UploadError>;
