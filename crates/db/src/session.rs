//! Request-scoped connection sessions and the query executor.

use crate::error::{DbError, DbResult};
use crate::pool::Pool;
use crate::value::{Row, SqlParam, SqlValue};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Postgres, Row as _, Sqlite, Transaction, TypeInfo};
use time::format_description::well_known::Rfc3339;

/// What to fetch from a statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fetch {
    /// Execute only; no result rows are read.
    None,
    /// Read at most one row.
    One,
    /// Read every row.
    All,
}

/// Result of [`DbSession::execute_query`], shaped by the [`Fetch`] mode.
#[derive(Clone, Debug)]
pub enum QueryOutcome {
    None,
    Row(Option<Row>),
    Rows(Vec<Row>),
}

impl QueryOutcome {
    /// The single row, if this outcome carries one.
    pub fn into_row(self) -> Option<Row> {
        match self {
            Self::Row(row) => row,
            _ => None,
        }
    }

    /// The row list, if this outcome carries one.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }
}

enum SessionTx {
    Postgres(Transaction<'static, Postgres>),
    Sqlite(Transaction<'static, Sqlite>),
}

/// Request-scoped connection context.
///
/// A session owns at most one pooled connection, checked out lazily on the
/// first query and held until [`release`](Self::release) or drop. All
/// statements run inside an implicit transaction on that connection:
/// uncommitted writes are visible to later queries on the same session and
/// invisible everywhere else until committed.
///
/// Dropping the session returns the connection to the pool and discards any
/// uncommitted work; calling `release` does the same thing eagerly and is
/// idempotent. A query issued after release simply checks out a fresh
/// connection.
pub struct DbSession {
    pool: Pool,
    tx: Option<SessionTx>,
}

impl DbSession {
    pub(crate) fn new(pool: Pool) -> Self {
        Self { pool, tx: None }
    }

    /// Whether this session currently holds a connection.
    pub fn holds_connection(&self) -> bool {
        self.tx.is_some()
    }

    /// Execute one parameterized statement.
    ///
    /// Parameters bind positionally to `$1`..`$n`. With `commit` the open
    /// transaction is committed before returning; otherwise the statement's
    /// effects stay uncommitted on this session's connection and callers
    /// must commit explicitly when durability is required.
    ///
    /// On a database error the transaction is rolled back, the error is
    /// logged, and a generic [`DbError::Query`] preserving the driver's
    /// message is returned.
    pub async fn execute_query(
        &mut self,
        sql: &str,
        params: &[SqlParam],
        fetch: Fetch,
        commit: bool,
    ) -> DbResult<QueryOutcome> {
        let outcome = match self.run(sql, params, fetch).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, sql, "database error, rolling back");
                if let Err(rollback_err) = self.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback after failed statement also failed");
                }
                return Err(e);
            }
        };

        if commit {
            self.commit().await?;
        }

        Ok(outcome)
    }

    /// Fetch at most one row without committing.
    pub async fn fetch_one(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<Option<Row>> {
        Ok(self
            .execute_query(sql, params, Fetch::One, false)
            .await?
            .into_row())
    }

    /// Fetch every row without committing.
    pub async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<Row>> {
        Ok(self
            .execute_query(sql, params, Fetch::All, false)
            .await?
            .into_rows())
    }

    /// Execute a statement with no result rows.
    pub async fn execute(&mut self, sql: &str, params: &[SqlParam], commit: bool) -> DbResult<()> {
        self.execute_query(sql, params, Fetch::None, commit)
            .await
            .map(|_| ())
    }

    /// Commit the session's open transaction, if any.
    ///
    /// Explicit caller-controlled transaction boundary; the next statement
    /// on this session starts a new transaction. A no-op when nothing is
    /// open.
    pub async fn commit(&mut self) -> DbResult<()> {
        if let Some(tx) = self.tx.take() {
            let result = match tx {
                SessionTx::Postgres(tx) => tx.commit().await,
                SessionTx::Sqlite(tx) => tx.commit().await,
            };
            result.map_err(|e| DbError::Query(e.to_string()))?;
        }
        Ok(())
    }

    /// Roll back the session's open transaction, if any.
    pub async fn rollback(&mut self) -> DbResult<()> {
        if let Some(tx) = self.tx.take() {
            let result = match tx {
                SessionTx::Postgres(tx) => tx.rollback().await,
                SessionTx::Sqlite(tx) => tx.rollback().await,
            };
            result.map_err(|e| DbError::Query(e.to_string()))?;
        }
        Ok(())
    }

    /// Return the session's connection to the pool, discarding any
    /// uncommitted work.
    ///
    /// Idempotent: calling twice is a no-op, and the connection is never
    /// returned to the pool twice.
    pub async fn release(&mut self) {
        if let Some(tx) = self.tx.take() {
            let result = match tx {
                SessionTx::Postgres(tx) => tx.rollback().await,
                SessionTx::Sqlite(tx) => tx.rollback().await,
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to roll back on release");
            }
        }
    }

    /// Get the open transaction, lazily checking out a connection and
    /// beginning one on first use.
    async fn tx_mut(&mut self) -> DbResult<&mut SessionTx> {
        if self.tx.is_none() {
            let tx = match &self.pool {
                Pool::Postgres(pool) => {
                    SessionTx::Postgres(pool.begin().await.map_err(DbError::Checkout)?)
                }
                Pool::Sqlite(pool) => {
                    SessionTx::Sqlite(pool.begin().await.map_err(DbError::Checkout)?)
                }
            };
            self.tx = Some(tx);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| DbError::Query("connection state lost".to_string()))
    }

    async fn run(&mut self, sql: &str, params: &[SqlParam], fetch: Fetch) -> DbResult<QueryOutcome> {
        match self.tx_mut().await? {
            SessionTx::Postgres(tx) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_pg(query, param);
                }
                match fetch {
                    Fetch::None => {
                        query.execute(&mut **tx).await.map_err(query_err)?;
                        Ok(QueryOutcome::None)
                    }
                    Fetch::One => {
                        let row = query.fetch_optional(&mut **tx).await.map_err(query_err)?;
                        Ok(QueryOutcome::Row(row.map(decode_pg_row).transpose()?))
                    }
                    Fetch::All => {
                        let rows = query.fetch_all(&mut **tx).await.map_err(query_err)?;
                        let rows = rows
                            .into_iter()
                            .map(decode_pg_row)
                            .collect::<DbResult<Vec<_>>>()?;
                        Ok(QueryOutcome::Rows(rows))
                    }
                }
            }
            SessionTx::Sqlite(tx) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_sqlite(query, param);
                }
                match fetch {
                    Fetch::None => {
                        query.execute(&mut **tx).await.map_err(query_err)?;
                        Ok(QueryOutcome::None)
                    }
                    Fetch::One => {
                        let row = query.fetch_optional(&mut **tx).await.map_err(query_err)?;
                        Ok(QueryOutcome::Row(row.map(decode_sqlite_row).transpose()?))
                    }
                    Fetch::All => {
                        let rows = query.fetch_all(&mut **tx).await.map_err(query_err)?;
                        let rows = rows
                            .into_iter()
                            .map(decode_sqlite_row)
                            .collect::<DbResult<Vec<_>>>()?;
                        Ok(QueryOutcome::Rows(rows))
                    }
                }
            }
        }
    }
}

fn query_err(e: sqlx::Error) -> DbError {
    DbError::Query(e.to_string())
}

fn bind_pg<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &SqlParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        SqlParam::Null => query.bind(Option::<String>::None),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.clone()),
        SqlParam::Bytes(v) => query.bind(v.clone()),
    }
}

fn bind_sqlite<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &SqlParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        SqlParam::Null => query.bind(Option::<String>::None),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.clone()),
        SqlParam::Bytes(v) => query.bind(v.clone()),
    }
}

fn decode_pg_row(row: PgRow) -> DbResult<Row> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let value = decode_pg_value(&row, i, column.type_info().name())?;
        out.insert(name, value);
    }
    Ok(out)
}

fn decode_pg_value(row: &PgRow, index: usize, type_name: &str) -> DbResult<SqlValue> {
    let value = match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .map_err(query_err)?
            .map(SqlValue::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .map_err(query_err)?
            .map(|v| SqlValue::Int(v as i64)),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .map_err(query_err)?
            .map(|v| SqlValue::Int(v as i64)),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .map_err(query_err)?
            .map(SqlValue::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .map_err(query_err)?
            .map(|v| SqlValue::Float(v as f64)),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)
            .map_err(query_err)?
            .map(SqlValue::Float),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .map_err(query_err)?
            .map(SqlValue::Bytes),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(index)
            .map_err(query_err)?
            .map(|v| SqlValue::Text(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<time::OffsetDateTime>, _>(index)
            .map_err(query_err)?
            .map(|v| match v.format(&Rfc3339) {
                Ok(s) => SqlValue::Text(s),
                Err(_) => SqlValue::Text(v.to_string()),
            }),
        "TIMESTAMP" => row
            .try_get::<Option<time::PrimitiveDateTime>, _>(index)
            .map_err(query_err)?
            .map(|v| SqlValue::Text(v.to_string())),
        // TEXT, VARCHAR, CHAR, NAME and anything else with a textual
        // representation falls through to a plain string read
        _ => row
            .try_get::<Option<String>, _>(index)
            .map_err(query_err)?
            .map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

fn decode_sqlite_row(row: SqliteRow) -> DbResult<Row> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let value = decode_sqlite_value(&row, i, column.type_info().name())?;
        out.insert(name, value);
    }
    Ok(out)
}

fn decode_sqlite_value(row: &SqliteRow, index: usize, type_name: &str) -> DbResult<SqlValue> {
    let value = match type_name {
        "NULL" => None,
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .map_err(query_err)?
            .map(SqlValue::Bool),
        "INTEGER" | "INT" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .map_err(query_err)?
            .map(SqlValue::Int),
        "REAL" => row
            .try_get::<Option<f64>, _>(index)
            .map_err(query_err)?
            .map(SqlValue::Float),
        "BLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .map_err(query_err)?
            .map(SqlValue::Bytes),
        _ => row
            .try_get::<Option<String>, _>(index)
            .map_err(query_err)?
            .map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Database;
    use attest_core::config::DatabaseConfig;
    use tempfile::tempdir;

    async fn test_db(max_connections: u32) -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let config = DatabaseConfig::Sqlite {
            path: dir.path().join("session.db"),
            max_connections,
        };
        let db = Database::connect(&config).await.unwrap();
        (dir, db)
    }

    async fn create_table(db: &Database) {
        let mut session = db.session();
        session
            .execute(
                "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, done BOOLEAN NOT NULL DEFAULT 0)",
                &[],
                true,
            )
            .await
            .unwrap();
        session.release().await;
    }

    #[tokio::test]
    async fn test_execute_query_fetch_modes() {
        let (_dir, db) = test_db(5).await;
        create_table(&db).await;

        let mut session = db.session();
        session
            .execute(
                "INSERT INTO items (id, name) VALUES ($1, $2)",
                &[SqlParam::Int(1), SqlParam::Text("alpha".to_string())],
                true,
            )
            .await
            .unwrap();
        session
            .execute(
                "INSERT INTO items (id, name) VALUES ($1, $2)",
                &[SqlParam::Int(2), SqlParam::Text("beta".to_string())],
                true,
            )
            .await
            .unwrap();

        let outcome = session
            .execute_query("SELECT name FROM items ORDER BY id", &[], Fetch::None, false)
            .await
            .unwrap();
        assert!(matches!(outcome, QueryOutcome::None));

        let row = session
            .fetch_one("SELECT name FROM items WHERE id = $1", &[SqlParam::Int(2)])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get_str("name"), Some("beta"));

        let rows = session
            .fetch_all("SELECT id, name FROM items ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_int("id"), Some(1));
        assert_eq!(rows[1].get_str("name"), Some("beta"));

        // No matching row reads back as None, not an error
        let missing = session
            .fetch_one("SELECT name FROM items WHERE id = $1", &[SqlParam::Int(99)])
            .await
            .unwrap();
        assert!(missing.is_none());

        session.release().await;
    }

    #[tokio::test]
    async fn test_uncommitted_write_invisible_to_fresh_session() {
        let (_dir, db) = test_db(5).await;
        create_table(&db).await;

        let mut writer = db.session();
        writer
            .execute(
                "INSERT INTO items (id, name) VALUES ($1, $2)",
                &[SqlParam::Int(1), SqlParam::Text("draft".to_string())],
                false,
            )
            .await
            .unwrap();

        // The writer observes its own uncommitted insert
        let own = writer
            .fetch_one("SELECT name FROM items WHERE id = $1", &[SqlParam::Int(1)])
            .await
            .unwrap();
        assert!(own.is_some());

        // A fresh session does not
        let mut reader = db.session();
        let other = reader
            .fetch_one("SELECT name FROM items WHERE id = $1", &[SqlParam::Int(1)])
            .await
            .unwrap();
        assert!(other.is_none());
        reader.release().await;

        // After commit the row is immediately visible to a new session
        writer.commit().await.unwrap();
        let mut reader = db.session();
        let visible = reader
            .fetch_one("SELECT name FROM items WHERE id = $1", &[SqlParam::Int(1)])
            .await
            .unwrap();
        assert!(visible.is_some());
        reader.release().await;
        writer.release().await;
    }

    #[tokio::test]
    async fn test_release_discards_uncommitted_write() {
        let (_dir, db) = test_db(5).await;
        create_table(&db).await;

        let mut writer = db.session();
        writer
            .execute(
                "INSERT INTO items (id, name) VALUES ($1, $2)",
                &[SqlParam::Int(7), SqlParam::Text("gone".to_string())],
                false,
            )
            .await
            .unwrap();
        writer.release().await;

        let mut reader = db.session();
        let row = reader
            .fetch_one("SELECT name FROM items WHERE id = $1", &[SqlParam::Int(7)])
            .await
            .unwrap();
        assert!(row.is_none());
        reader.release().await;
    }

    #[tokio::test]
    async fn test_release_twice_is_a_no_op() {
        let (_dir, db) = test_db(2).await;
        create_table(&db).await;

        let mut session = db.session();
        session.fetch_one("SELECT 1 AS one", &[]).await.unwrap();
        assert!(session.holds_connection());

        session.release().await;
        assert!(!session.holds_connection());
        session.release().await;
        assert!(!session.holds_connection());

        // The session stays usable: the next query checks out anew
        let row = session.fetch_one("SELECT 1 AS one", &[]).await.unwrap();
        assert!(row.is_some());
        session.release().await;
    }

    #[tokio::test]
    async fn test_query_error_is_generic_and_rolls_back() {
        let (_dir, db) = test_db(5).await;
        create_table(&db).await;

        let mut session = db.session();
        session
            .execute(
                "INSERT INTO items (id, name) VALUES ($1, $2)",
                &[SqlParam::Int(1), SqlParam::Text("pending".to_string())],
                false,
            )
            .await
            .unwrap();

        let err = session
            .execute("INSERT INTO nonexistent_table VALUES (1)", &[], false)
            .await
            .unwrap_err();
        match err {
            DbError::Query(message) => {
                assert!(message.contains("nonexistent_table"), "message: {message}");
            }
            other => panic!("expected query error, got {other:?}"),
        }

        // The failed statement rolled the transaction back, taking the
        // uncommitted insert with it
        assert!(!session.holds_connection());
        let row = session
            .fetch_one("SELECT name FROM items WHERE id = $1", &[SqlParam::Int(1)])
            .await
            .unwrap();
        assert!(row.is_none());
        session.release().await;
    }

    #[tokio::test]
    async fn test_null_and_typed_params_roundtrip() {
        let (_dir, db) = test_db(5).await;

        let mut session = db.session();
        session
            .execute(
                "CREATE TABLE mixed (t TEXT, i INTEGER, f REAL, b BLOB, n TEXT)",
                &[],
                true,
            )
            .await
            .unwrap();
        session
            .execute(
                "INSERT INTO mixed (t, i, f, b, n) VALUES ($1, $2, $3, $4, $5)",
                &[
                    SqlParam::Text("txt".to_string()),
                    SqlParam::Int(-5),
                    SqlParam::Float(2.5),
                    SqlParam::Bytes(vec![1, 2, 3]),
                    SqlParam::Null,
                ],
                true,
            )
            .await
            .unwrap();

        let row = session
            .fetch_one("SELECT t, i, f, b, n FROM mixed", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get_str("t"), Some("txt"));
        assert_eq!(row.get_int("i"), Some(-5));
        assert_eq!(row.get("f"), Some(&SqlValue::Float(2.5)));
        assert_eq!(row.get("b"), Some(&SqlValue::Bytes(vec![1, 2, 3])));
        assert!(row.get("n").is_some_and(SqlValue::is_null));
        session.release().await;
    }
}
