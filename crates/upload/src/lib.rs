//! Chunked upload session store for the Attest server.
//!
//! Uploads arrive as sequentially indexed byte ranges. Each session lives in
//! its own directory holding one file per chunk plus a metadata document;
//! once every chunk is present the session can be assembled into the final
//! file and validated.

pub mod error;
pub mod store;

pub use error::{UploadError, UploadResult};
pub use store::{AssembledUpload, ChunkStore, file_header};
