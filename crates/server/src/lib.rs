//! HTTP control plane for the Attest evidence upload server.
//!
//! This crate provides the JSON API:
//! - Upload session creation and cancellation
//! - Chunk upload and session status
//! - Assembly with MIME validation
//! - Health checks

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
