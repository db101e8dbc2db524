//! libSQL backend for the async `Database` trait.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Database, GateRecord, NewCode, RawMessage, StoredCode};

const CODE_COLUMNS: &str =
    "id, message_id, sender, organization, recipient, code, topic, created_at";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Fixed-width RFC 3339 so that text comparison orders by time.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map an insert failure, singling out uniqueness violations.
fn insert_error(op: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {message}"))
    } else {
        DatabaseError::Query(format!("{op}: {message}"))
    }
}

/// Map a libsql Row to a StoredCode. Column order matches CODE_COLUMNS.
fn row_to_code(row: &libsql::Row) -> Result<StoredCode, libsql::Error> {
    Ok(StoredCode {
        id: row.get(0)?,
        message_id: row.get(1)?,
        sender: row.get(2)?,
        organization: row.get(3)?,
        recipient: row.get(4)?,
        code: row.get(5)?,
        topic: row.get(6)?,
        created_at: parse_datetime(&row.get::<String>(7)?),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn message_exists(&self, message_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM raw_messages WHERE message_id = ?1 LIMIT 1",
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("message_exists: {e}")))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(DatabaseError::Query(format!("message_exists: {e}"))),
        }
    }

    async fn insert_raw_message(&self, message: &RawMessage) -> Result<(), DatabaseError> {
        let id = Uuid::new_v4().to_string();
        self.conn()
            .execute(
                "INSERT INTO raw_messages (id, message_id, sender, recipient, raw, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.clone(),
                    message.message_id.as_str(),
                    message.sender.as_str(),
                    message.recipient.as_str(),
                    message.raw.as_str(),
                    timestamp(Utc::now()),
                ],
            )
            .await
            .map_err(|e| insert_error("insert_raw_message", e))?;

        debug!(id = %id, message_id = %message.message_id, "Raw message inserted");
        Ok(())
    }

    async fn prune_raw_messages(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let deleted = self
            .conn()
            .execute(
                "DELETE FROM raw_messages WHERE received_at < ?1",
                params![timestamp(cutoff)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_raw_messages: {e}")))?;
        Ok(deleted as usize)
    }

    async fn insert_code(&self, code: &NewCode) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        self.conn()
            .execute(
                "INSERT INTO codes (id, message_id, sender, organization, recipient, code,
                    topic, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id.clone(),
                    code.message_id.as_str(),
                    code.sender.as_str(),
                    code.organization.as_str(),
                    code.recipient.as_str(),
                    code.code.as_str(),
                    code.topic.as_str(),
                    timestamp(Utc::now()),
                ],
            )
            .await
            .map_err(|e| insert_error("insert_code", e))?;

        debug!(id = %id, message_id = %code.message_id, "Code inserted");
        Ok(id)
    }

    async fn recent_codes(&self, limit: usize) -> Result<Vec<StoredCode>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CODE_COLUMNS} FROM codes ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_codes: {e}")))?;

        let mut codes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_codes: {e}")))?
        {
            let code =
                row_to_code(&row).map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
            codes.push(code);
        }
        Ok(codes)
    }

    async fn prune_codes(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let deleted = self
            .conn()
            .execute(
                "DELETE FROM codes WHERE created_at < ?1",
                params![timestamp(cutoff)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_codes: {e}")))?;
        Ok(deleted as usize)
    }

    async fn get_gate_record(&self, key: &str) -> Result<Option<GateRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT key, last_code, consecutive_count, last_updated
                 FROM gate_records WHERE key = ?1",
                params![key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_gate_record: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_gate_record: {e}")))?
        else {
            return Ok(None);
        };

        let parse = |e: libsql::Error| DatabaseError::Query(format!("gate row parse: {e}"));
        let count: i64 = row.get(2).map_err(parse)?;
        Ok(Some(GateRecord {
            key: row.get(0).map_err(parse)?,
            last_code: row.get(1).map_err(parse)?,
            consecutive_count: u32::try_from(count).unwrap_or(1).max(1),
            last_updated: parse_datetime(&row.get::<String>(3).map_err(parse)?),
        }))
    }

    async fn upsert_gate_record(
        &self,
        key: &str,
        code: &str,
        count: u32,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO gate_records (key, last_code, consecutive_count, last_updated)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                    last_code = excluded.last_code,
                    consecutive_count = excluded.consecutive_count,
                    last_updated = excluded.last_updated",
                params![key, code, i64::from(count), timestamp(Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_gate_record: {e}")))?;
        Ok(())
    }

    async fn delete_gate_record(&self, key: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute("DELETE FROM gate_records WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_gate_record: {e}")))?;
        Ok(())
    }

    async fn delete_gate_record_if(
        &self,
        key: &str,
        code: &str,
        count: u32,
    ) -> Result<bool, DatabaseError> {
        let deleted = self
            .conn()
            .execute(
                "DELETE FROM gate_records
                 WHERE key = ?1 AND last_code = ?2 AND consecutive_count = ?3",
                params![key, code, i64::from(count)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_gate_record_if: {e}")))?;
        Ok(deleted > 0)
    }

    async fn prune_gate_records(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let deleted = self
            .conn()
            .execute(
                "DELETE FROM gate_records WHERE last_updated < ?1",
                params![timestamp(cutoff)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_gate_records: {e}")))?;
        Ok(deleted as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn raw(id: &str) -> RawMessage {
        RawMessage {
            message_id: id.to_string(),
            sender: "noreply@service.com".to_string(),
            recipient: "me@inbox.dev".to_string(),
            raw: "Subject: Your code\r\n\r\nYour code is 123456".to_string(),
        }
    }

    fn new_code(message_id: &str, code: &str) -> NewCode {
        NewCode {
            message_id: message_id.to_string(),
            sender: "noreply@service.com".to_string(),
            organization: "service.com".to_string(),
            recipient: "me@inbox.dev".to_string(),
            code: code.to_string(),
            topic: "login".to_string(),
        }
    }

    // ── Raw message tests ───────────────────────────────────────────

    #[tokio::test]
    async fn insert_and_check_exists() {
        let db = test_db().await;
        assert!(!db.message_exists("m1").await.unwrap());

        db.insert_raw_message(&raw("m1")).await.unwrap();
        assert!(db.message_exists("m1").await.unwrap());
        assert!(!db.message_exists("m2").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_message_id_is_constraint_error() {
        let db = test_db().await;
        db.insert_raw_message(&raw("dup")).await.unwrap();

        let err = db.insert_raw_message(&raw("dup")).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    // ── Code tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn insert_and_list_codes() {
        let db = test_db().await;
        db.insert_code(&new_code("m1", "111111")).await.unwrap();
        db.insert_code(&new_code("m2", "222222")).await.unwrap();

        let codes = db.recent_codes(10).await.unwrap();
        assert_eq!(codes.len(), 2);
        assert_eq!(codes[0].code, "222222", "most recent first");
        assert_eq!(codes[1].organization, "service.com");
    }

    #[tokio::test]
    async fn recent_codes_respects_limit() {
        let db = test_db().await;
        for i in 0..5 {
            db.insert_code(&new_code(&format!("m{i}"), "000001"))
                .await
                .unwrap();
        }
        assert_eq!(db.recent_codes(3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn leading_zero_code_round_trips() {
        let db = test_db().await;
        db.insert_code(&new_code("m1", "047422")).await.unwrap();
        assert_eq!(db.recent_codes(1).await.unwrap()[0].code, "047422");
    }

    #[tokio::test]
    async fn prune_codes_by_cutoff() {
        let db = test_db().await;
        db.insert_code(&new_code("m1", "1")).await.unwrap();

        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(db.prune_codes(past).await.unwrap(), 0);

        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(db.prune_codes(future).await.unwrap(), 1);
        assert!(db.recent_codes(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pruned_raw_message_is_forgotten() {
        let db = test_db().await;
        db.insert_raw_message(&raw("m1")).await.unwrap();

        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(db.prune_raw_messages(past).await.unwrap(), 0);
        assert!(db.message_exists("m1").await.unwrap());

        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(db.prune_raw_messages(future).await.unwrap(), 1);
        assert!(!db.message_exists("m1").await.unwrap());
    }

    // ── Gate record tests ───────────────────────────────────────────

    #[tokio::test]
    async fn gate_record_lifecycle() {
        let db = test_db().await;
        assert!(db.get_gate_record("k").await.unwrap().is_none());

        db.upsert_gate_record("k", "123", 1).await.unwrap();
        let record = db.get_gate_record("k").await.unwrap().unwrap();
        assert_eq!(record.last_code, "123");
        assert_eq!(record.consecutive_count, 1);

        db.upsert_gate_record("k", "123", 2).await.unwrap();
        let record = db.get_gate_record("k").await.unwrap().unwrap();
        assert_eq!(record.consecutive_count, 2);

        db.delete_gate_record("k").await.unwrap();
        assert!(db.get_gate_record("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conditional_gate_delete_needs_matching_state() {
        let db = test_db().await;
        db.upsert_gate_record("k", "123", 2).await.unwrap();

        assert!(!db.delete_gate_record_if("k", "123", 1).await.unwrap());
        assert!(!db.delete_gate_record_if("k", "999", 2).await.unwrap());
        assert!(db.get_gate_record("k").await.unwrap().is_some());

        assert!(db.delete_gate_record_if("k", "123", 2).await.unwrap());
        assert!(db.get_gate_record("k").await.unwrap().is_none());
        assert!(!db.delete_gate_record_if("k", "123", 2).await.unwrap());
    }

    #[tokio::test]
    async fn prune_gate_records_by_cutoff() {
        let db = test_db().await;
        db.upsert_gate_record("a", "1", 1).await.unwrap();
        db.upsert_gate_record("b", "2", 2).await.unwrap();

        let future = Utc::now() + chrono::Duration::minutes(1);
        assert_eq!(db.prune_gate_records(future).await.unwrap(), 2);
        assert!(db.get_gate_record("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn local_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("codes.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.insert_raw_message(&raw("persisted")).await.unwrap();
        }

        let reopened = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(reopened.message_exists("persisted").await.unwrap());
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let a = timestamp(DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().into());
        let b = timestamp(
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00.5Z")
                .unwrap()
                .into(),
        );
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_datetime(&a).timestamp(), 1_767_225_600);
    }
}
