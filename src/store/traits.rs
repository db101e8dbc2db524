//! Unified `Database` trait: one async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DatabaseError;

/// Inbound email as received, keyed by the upstream message identifier.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub message_id: String,
    pub sender: String,
    pub recipient: String,
    pub raw: String,
}

/// An extracted code ready to be stored.
#[derive(Debug, Clone)]
pub struct NewCode {
    pub message_id: String,
    /// Envelope sender of the forwarded email.
    pub sender: String,
    /// Sender address or organization label reported by the model.
    pub organization: String,
    pub recipient: String,
    pub code: String,
    pub topic: String,
}

/// A persisted code row.
#[derive(Debug, Clone, Serialize)]
pub struct StoredCode {
    pub id: String,
    pub message_id: String,
    pub sender: String,
    pub organization: String,
    pub recipient: String,
    pub code: String,
    pub topic: String,
    pub created_at: DateTime<Utc>,
}

/// Repeat-gate counter for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRecord {
    pub key: String,
    pub last_code: String,
    pub consecutive_count: u32,
    pub last_updated: DateTime<Utc>,
}

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Raw messages ────────────────────────────────────────────────

    /// Whether a raw message with this upstream id was already stored.
    async fn message_exists(&self, message_id: &str) -> Result<bool, DatabaseError>;

    /// Insert a raw message. A duplicate `message_id` is `DatabaseError::Constraint`.
    async fn insert_raw_message(&self, message: &RawMessage) -> Result<(), DatabaseError>;

    /// Delete raw messages received before `cutoff`. Returns the number deleted.
    ///
    /// A pruned message id is no longer recognized as a duplicate.
    async fn prune_raw_messages(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError>;

    // ── Codes ───────────────────────────────────────────────────────

    /// Insert an extracted code. Returns the generated row id.
    async fn insert_code(&self, code: &NewCode) -> Result<String, DatabaseError>;

    /// Most recent codes first, up to `limit`.
    async fn recent_codes(&self, limit: usize) -> Result<Vec<StoredCode>, DatabaseError>;

    /// Delete codes created before `cutoff`. Returns the number deleted.
    async fn prune_codes(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError>;

    // ── Repeat gate ─────────────────────────────────────────────────

    async fn get_gate_record(&self, key: &str) -> Result<Option<GateRecord>, DatabaseError>;

    /// Create or replace the record for `key`, stamping it with the current time.
    async fn upsert_gate_record(
        &self,
        key: &str,
        code: &str,
        count: u32,
    ) -> Result<(), DatabaseError>;

    async fn delete_gate_record(&self, key: &str) -> Result<(), DatabaseError>;

    /// Delete the record for `key` only while it still holds `code` at
    /// `count`. Returns whether a row was deleted.
    async fn delete_gate_record_if(
        &self,
        key: &str,
        code: &str,
        count: u32,
    ) -> Result<bool, DatabaseError>;

    /// Delete gate records last updated before `cutoff`. Returns the number deleted.
    async fn prune_gate_records(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError>;
}
