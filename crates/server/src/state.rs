//! Application state shared across handlers.

use attest_core::config::AppConfig;
use attest_core::sniff::MimePolicy;
use attest_db::{AuditLog, Database};
use attest_upload::ChunkStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Database handle. Cloning shares the one pool.
    pub db: Database,
    /// Chunked upload store.
    pub store: Arc<ChunkStore>,
    /// Audit log repository.
    pub audit: AuditLog,
    /// MIME allow-list for assembled files.
    pub mime_policy: Arc<MimePolicy>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: AppConfig, db: Database, store: ChunkStore) -> Self {
        let mime_policy = Arc::new(MimePolicy::new(
            config.upload.allowed_mime_types.iter().cloned(),
        ));
        let audit = AuditLog::new(db.clone());
        Self {
            config: Arc::new(config),
            db,
            store: Arc::new(store),
            audit,
            mime_policy,
        }
    }
}
