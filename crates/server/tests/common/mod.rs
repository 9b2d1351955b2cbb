//! Server test utilities.

use attest_core::config::{AppConfig, DatabaseConfig, ServerConfig, UploadConfig};
use attest_db::Database;
use attest_server::{AppState, create_router};
use attest_upload::ChunkStore;
use tempfile::TempDir;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage and SQLite.
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let config = AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig::Sqlite {
                path: temp_dir.path().join("attest.db"),
                max_connections: 5,
            },
            upload: UploadConfig {
                root: temp_dir.path().join("uploads"),
                chunk_size: 1024,
                max_chunk_size: 1024 * 1024,
                allowed_mime_types: vec![
                    "application/pdf".to_string(),
                    "image/png".to_string(),
                ],
            },
        };

        let db = Database::connect(&config.database)
            .await
            .expect("Failed to connect to test database");
        db.migrate().await.expect("Failed to run migrations");

        let store = ChunkStore::new(&config.upload.root)
            .await
            .expect("Failed to create upload store");

        let state = AppState::new(config, db, store);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }
}
