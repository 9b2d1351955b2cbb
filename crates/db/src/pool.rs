//! Connection pool handle.

use crate::error::{DbError, DbResult};
use crate::session::DbSession;
use attest_core::config::DatabaseConfig;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{PgPool, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

/// Embedded schema (dialect-neutral DDL).
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Split a schema file into individual statements.
///
/// Prepared statements take one statement at a time, so the schema is
/// executed piecewise. Comment-only fragments are skipped.
fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

#[derive(Clone, Debug)]
pub(crate) enum Pool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Bounded connection pool behind an explicit service handle.
///
/// Constructed once at process startup and shared by cloning (the handle is
/// cheap to clone; all clones share the same pool). Request handlers obtain
/// per-request [`DbSession`]s via [`Database::session`]; nothing else hands
/// out connections.
#[derive(Clone, Debug)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Connect to the configured database and build the pool.
    ///
    /// Construction failure (unreachable database, bad credentials)
    /// propagates to the caller; there is no retry here.
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        config.validate().map_err(DbError::Config)?;

        let pool = match config {
            DatabaseConfig::Sqlite {
                path,
                max_connections,
            } => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            DbError::Config(format!(
                                "failed to create database directory: {e}"
                            ))
                        })?;
                    }
                }

                let opts =
                    SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
                        .map_err(DbError::Connect)?
                        .create_if_missing(true)
                        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                        // Prevent transient "database is locked" errors under
                        // concurrent access.
                        .busy_timeout(Duration::from_secs(5));

                let pool = SqlitePoolOptions::new()
                    .max_connections(*max_connections)
                    .connect_with(opts)
                    .await
                    .map_err(DbError::Connect)?;
                Pool::Sqlite(pool)
            }
            DatabaseConfig::Postgres {
                url,
                host,
                port,
                username,
                password,
                database,
                min_connections,
                max_connections,
                acquire_timeout_secs,
            } => {
                let mut opts = match url {
                    Some(url) => PgConnectOptions::from_str(url).map_err(DbError::Connect)?,
                    None => {
                        let mut opts = PgConnectOptions::new();
                        if let Some(host) = host {
                            opts = opts.host(host);
                        }
                        if let Some(port) = port {
                            opts = opts.port(*port);
                        }
                        if let Some(database) = database {
                            opts = opts.database(database);
                        }
                        if let Some(user) = username {
                            opts = opts.username(user);
                        }
                        if let Some(pass) = password {
                            opts = opts.password(pass);
                        }
                        opts
                    }
                };
                opts = opts.application_name("attest");

                // Log connection info without the password
                tracing::info!(
                    host = host.as_deref().unwrap_or("<url>"),
                    database = database.as_deref().unwrap_or("<url>"),
                    username = username.as_deref().unwrap_or("<none>"),
                    min_connections,
                    max_connections,
                    "Connecting to PostgreSQL"
                );

                let pool = PgPoolOptions::new()
                    .min_connections(*min_connections)
                    .max_connections(*max_connections)
                    // An exhausted pool blocks checkouts until a connection
                    // frees up, bounded by this timeout.
                    .acquire_timeout(Duration::from_secs(*acquire_timeout_secs))
                    .connect_with(opts)
                    .await
                    .map_err(DbError::Connect)?;
                Pool::Postgres(pool)
            }
        };

        Ok(Self { pool })
    }

    /// Start a request-scoped session.
    ///
    /// The underlying connection is checked out lazily on the session's
    /// first query and held until the session is released or dropped.
    pub fn session(&self) -> DbSession {
        DbSession::new(self.pool.clone())
    }

    /// Run schema migrations.
    pub async fn migrate(&self) -> DbResult<()> {
        for statement in schema_statements(SCHEMA_SQL) {
            self.execute_raw(statement).await?;
        }
        Ok(())
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> DbResult<()> {
        self.execute_raw("SELECT 1").await
    }

    /// Close all pooled connections.
    ///
    /// Intended for process shutdown. Safe to call more than once; safe to
    /// call concurrently with in-flight sessions (they fail their next
    /// checkout instead of hanging).
    pub async fn close(&self) {
        match &self.pool {
            Pool::Postgres(pool) => pool.close().await,
            Pool::Sqlite(pool) => pool.close().await,
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        match &self.pool {
            Pool::Postgres(pool) => pool.is_closed(),
            Pool::Sqlite(pool) => pool.is_closed(),
        }
    }

    async fn execute_raw(&self, sql: &str) -> DbResult<()> {
        let result = match &self.pool {
            Pool::Postgres(pool) => sqlx::query(sql).execute(pool).await.map(|_| ()),
            Pool::Sqlite(pool) => sqlx::query(sql).execute(pool).await.map(|_| ()),
        };
        result.map_err(|e| DbError::Query(e.to_string()))
    }
}
