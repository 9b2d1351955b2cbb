//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Database configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    /// SQLite database (recommended for testing and small deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Maximum connections in the pool. SQLite permits limited write
        /// concurrency; keep this small.
        #[serde(default = "default_sqlite_max_connections")]
        max_connections: u32,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL (optional if using individual fields).
        /// Takes precedence over individual fields if both are provided.
        url: Option<String>,
        /// Database host (e.g., "localhost" or "db.example.com").
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer the ATTEST_DATABASE__PASSWORD env var over
        /// storing this in a config file.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// Minimum idle connections kept in the pool.
        #[serde(default = "default_min_connections")]
        min_connections: u32,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// How long a checkout may wait for a free connection before
        /// giving up. Checkout from an exhausted pool blocks up to this
        /// long rather than failing fast.
        #[serde(default = "default_acquire_timeout_secs")]
        acquire_timeout_secs: u64,
    },
}

fn default_sqlite_max_connections() -> u32 {
    1
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_min_connections() -> u32 {
    1
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/attest.db"),
            max_connections: default_sqlite_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// Validate database configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            DatabaseConfig::Sqlite { max_connections, .. } => {
                if *max_connections == 0 {
                    return Err("database.max_connections cannot be 0".to_string());
                }
                Ok(())
            }
            DatabaseConfig::Postgres {
                url,
                host,
                database,
                min_connections,
                max_connections,
                ..
            } => {
                if *max_connections == 0 {
                    return Err("database.max_connections cannot be 0".to_string());
                }
                if min_connections > max_connections {
                    return Err(format!(
                        "database.min_connections {} exceeds max_connections {}",
                        min_connections, max_connections
                    ));
                }
                // Must have either url OR (host + database)
                match (url.as_ref(), host.as_ref(), database.as_ref()) {
                    (Some(_), _, _) => Ok(()),
                    (None, Some(_), Some(_)) => Ok(()),
                    (None, None, _) => Err(
                        "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                    ),
                    (None, Some(_), None) => Err(
                        "postgres config requires 'database' when using individual fields"
                            .to_string(),
                    ),
                }
            }
        }
    }
}

/// Chunked upload configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Root directory for upload sessions and preserved files.
    #[serde(default = "default_upload_root")]
    pub root: PathBuf,
    /// Chunk size advertised to clients, in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Maximum accepted chunk size, in bytes.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// MIME types an assembled file may have, checked by magic-number
    /// sniffing after assembly.
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

fn default_upload_root() -> PathBuf {
    PathBuf::from("./data/uploads")
}

fn default_chunk_size() -> u64 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_max_chunk_size() -> u64 {
    crate::MAX_CHUNK_SIZE
}

fn default_allowed_mime_types() -> Vec<String> {
    [
        "application/pdf",
        "image/png",
        "image/jpeg",
        "image/gif",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/vnd.ms-excel",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "application/zip",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            root: default_upload_root(),
            chunk_size: default_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

impl UploadConfig {
    /// Validate upload configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("upload.chunk_size cannot be 0".to_string());
        }
        if self.chunk_size > self.max_chunk_size {
            return Err(format!(
                "upload.chunk_size {} exceeds max_chunk_size {}",
                self.chunk_size, self.max_chunk_size
            ));
        }
        if self.allowed_mime_types.is_empty() {
            return Err("upload.allowed_mime_types cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Chunked upload configuration.
    #[serde(default)]
    pub upload: UploadConfig,
}

impl AppConfig {
    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.database.validate()?;
        self.upload.validate()?;
        Ok(())
    }

    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses SQLite and filesystem paths under
    /// `./data`; tests normally override them with temp directories.
    pub fn for_testing() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        AppConfig::default().validate().unwrap();
        AppConfig::for_testing().validate().unwrap();
    }

    #[test]
    fn test_postgres_requires_url_or_host_database() {
        let missing = DatabaseConfig::Postgres {
            url: None,
            host: None,
            port: default_pg_port(),
            username: None,
            password: None,
            database: None,
            min_connections: 1,
            max_connections: 5,
            acquire_timeout_secs: 30,
        };
        assert!(missing.validate().is_err());

        let host_only = DatabaseConfig::Postgres {
            url: None,
            host: Some("localhost".to_string()),
            port: default_pg_port(),
            username: None,
            password: None,
            database: None,
            min_connections: 1,
            max_connections: 5,
            acquire_timeout_secs: 30,
        };
        assert!(host_only.validate().is_err());

        let with_url = DatabaseConfig::Postgres {
            url: Some("postgres://localhost/attest".to_string()),
            host: None,
            port: default_pg_port(),
            username: None,
            password: None,
            database: None,
            min_connections: 1,
            max_connections: 5,
            acquire_timeout_secs: 30,
        };
        with_url.validate().unwrap();
    }

    #[test]
    fn test_postgres_pool_bounds_validated() {
        let inverted = DatabaseConfig::Postgres {
            url: Some("postgres://localhost/attest".to_string()),
            host: None,
            port: default_pg_port(),
            username: None,
            password: None,
            database: None,
            min_connections: 8,
            max_connections: 2,
            acquire_timeout_secs: 30,
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_database_config_deserialize_tagged() {
        let json = r#"{"type":"sqlite","path":"/tmp/test.db"}"#;
        let config: DatabaseConfig = serde_json::from_str(json).unwrap();
        match config {
            DatabaseConfig::Sqlite {
                path,
                max_connections,
            } => {
                assert_eq!(path, PathBuf::from("/tmp/test.db"));
                assert_eq!(max_connections, default_sqlite_max_connections());
            }
            _ => panic!("expected sqlite config"),
        }
    }

    #[test]
    fn test_upload_config_rejects_inverted_sizes() {
        let config = UploadConfig {
            chunk_size: crate::MAX_CHUNK_SIZE * 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_upload_config_rejects_empty_allow_list() {
        let config = UploadConfig {
            allowed_mime_types: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
