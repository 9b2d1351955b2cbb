//! Audit log repository.
//!
//! Every entry goes through the query executor; this repo issues no raw
//! driver calls of its own.

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::value::{Row, SqlParam};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// A single audit trail entry.
#[derive(Clone, Debug, PartialEq)]
pub struct AuditEntry {
    pub audit_id: String,
    pub username: String,
    pub action: String,
    pub object_type: String,
    pub object_id: String,
    pub detail: Option<String>,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

/// Records and reads audit entries.
#[derive(Clone)]
pub struct AuditLog {
    db: Database,
}

impl AuditLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert and commit one audit entry.
    pub async fn record(
        &self,
        username: &str,
        action: &str,
        object_type: &str,
        object_id: &str,
        detail: Option<&str>,
    ) -> DbResult<AuditEntry> {
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| DbError::Query(format!("failed to format timestamp: {e}")))?;
        let entry = AuditEntry {
            audit_id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            action: action.to_string(),
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
            detail: detail.map(|s| s.to_string()),
            created_at,
        };

        let mut session = self.db.session();
        let result = session
            .execute(
                "INSERT INTO auditlogs (audit_id, username, action, object_type, object_id, detail, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    SqlParam::Text(entry.audit_id.clone()),
                    SqlParam::Text(entry.username.clone()),
                    SqlParam::Text(entry.action.clone()),
                    SqlParam::Text(entry.object_type.clone()),
                    SqlParam::Text(entry.object_id.clone()),
                    entry.detail.clone().into(),
                    SqlParam::Text(entry.created_at.clone()),
                ],
                true,
            )
            .await;
        session.release().await;
        result?;

        tracing::debug!(
            action = %entry.action,
            object_id = %entry.object_id,
            "recorded audit entry"
        );
        Ok(entry)
    }

    /// Most recent entries, newest first.
    pub async fn recent(&self, limit: i64) -> DbResult<Vec<AuditEntry>> {
        let mut session = self.db.session();
        let rows = session
            .fetch_all(
                "SELECT audit_id, username, action, object_type, object_id, detail, created_at \
                 FROM auditlogs ORDER BY created_at DESC, audit_id LIMIT $1",
                &[SqlParam::Int(limit)],
            )
            .await;
        session.release().await;

        rows?.into_iter().map(entry_from_row).collect()
    }

    /// Entries for one object, newest first.
    pub async fn for_object(
        &self,
        object_type: &str,
        object_id: &str,
        limit: i64,
    ) -> DbResult<Vec<AuditEntry>> {
        let mut session = self.db.session();
        let rows = session
            .fetch_all(
                "SELECT audit_id, username, action, object_type, object_id, detail, created_at \
                 FROM auditlogs WHERE object_type = $1 AND object_id = $2 \
                 ORDER BY created_at DESC, audit_id LIMIT $3",
                &[
                    SqlParam::Text(object_type.to_string()),
                    SqlParam::Text(object_id.to_string()),
                    SqlParam::Int(limit),
                ],
            )
            .await;
        session.release().await;

        rows?.into_iter().map(entry_from_row).collect()
    }
}

fn entry_from_row(row: Row) -> DbResult<AuditEntry> {
    let field = |name: &str| -> DbResult<String> {
        row.get_str(name)
            .map(|s| s.to_string())
            .ok_or_else(|| DbError::Query(format!("auditlogs row is missing column {name}")))
    };
    Ok(AuditEntry {
        audit_id: field("audit_id")?,
        username: field("username")?,
        action: field("action")?,
        object_type: field("object_type")?,
        object_id: field("object_id")?,
        detail: row.get_str("detail").map(|s| s.to_string()),
        created_at: field("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::config::DatabaseConfig;
    use tempfile::tempdir;

    async fn audit_log() -> (tempfile::TempDir, AuditLog) {
        let dir = tempdir().unwrap();
        let config = DatabaseConfig::Sqlite {
            path: dir.path().join("audit.db"),
            max_connections: 2,
        };
        let db = Database::connect(&config).await.unwrap();
        db.migrate().await.unwrap();
        (dir, AuditLog::new(db))
    }

    #[tokio::test]
    async fn test_record_and_read_back() {
        let (_dir, audit) = audit_log().await;

        let entry = audit
            .record(
                "system",
                "Create Upload Session",
                "upload",
                "abc123",
                Some("created session abc123"),
            )
            .await
            .unwrap();
        audit
            .record("system", "Cancel Upload", "upload", "abc123", None)
            .await
            .unwrap();

        let recent = audit.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().any(|e| e.audit_id == entry.audit_id));
        assert!(recent.iter().any(|e| e.detail.is_none()));

        let scoped = audit.for_object("upload", "abc123", 10).await.unwrap();
        assert_eq!(scoped.len(), 2);
        let none = audit.for_object("upload", "other", 10).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_recent_respects_limit() {
        let (_dir, audit) = audit_log().await;
        for i in 0..5 {
            audit
                .record("system", "Action", "upload", &format!("obj-{i}"), None)
                .await
                .unwrap();
        }
        let limited = audit.recent(3).await.unwrap();
        assert_eq!(limited.len(), 3);
    }
}
