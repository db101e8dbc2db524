//! Repeat gate. Holds back sensitive codes until they recur.
//!
//! A password-reset code is released only when the same code arrives
//! `threshold` times in a row for the same key. This is a noise filter, not a
//! security boundary.
//!
//! Counters live in the [`Database`] so they survive across invocations.
//! Storage failures fail closed: the code is suppressed.
//!
//! The read and the write are separate statements. Release deletes the
//! record only if it still holds the state that was read, so concurrent
//! deliveries of one code release it at most once per sequence. Concurrent
//! increments may overwrite each other, which only delays release.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::error::DatabaseError;
use crate::extraction::Classification;
use crate::store::Database;

/// Repeat gate settings.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Consecutive identical codes needed for release.
    pub threshold: u32,
    /// Records older than this are treated as absent.
    pub ttl: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            ttl: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Suppress,
    Release,
}

pub struct RepeatGate {
    db: Arc<dyn Database>,
    config: GateConfig,
}

impl RepeatGate {
    pub fn new(db: Arc<dyn Database>, config: GateConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Decide whether `code` may be surfaced for `key`.
    ///
    /// Classifications that don't require gating are released without any
    /// storage access.
    pub async fn evaluate(
        &self,
        classification: Classification,
        key: &str,
        code: &str,
    ) -> GateDecision {
        if !classification.requires_gate() {
            return GateDecision::Release;
        }

        match self.evaluate_at(key, code, Utc::now()).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(key, error = %e, "repeat gate storage failed, suppressing code");
                GateDecision::Suppress
            }
        }
    }

    async fn evaluate_at(
        &self,
        key: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<GateDecision, DatabaseError> {
        let record = self
            .db
            .get_gate_record(key)
            .await?
            .filter(|r| !self.is_expired(r.last_updated, now));

        let previous = match record {
            Some(r) if r.last_code == code => r.consecutive_count,
            Some(_) => {
                debug!(key, "different code for key, resetting repeat count");
                0
            }
            None => 0,
        };
        let count = previous.saturating_add(1);

        if count >= self.config.threshold {
            let claimed = if previous == 0 {
                self.db.delete_gate_record(key).await?;
                true
            } else {
                self.db.delete_gate_record_if(key, code, previous).await?
            };
            if !claimed {
                info!(key, "gate record changed concurrently, suppressing code");
                return Ok(GateDecision::Suppress);
            }
            info!(key, count, "repeat threshold reached, releasing code");
            return Ok(GateDecision::Release);
        }

        self.db.upsert_gate_record(key, code, count).await?;
        debug!(key, count, threshold = self.config.threshold, "code held by repeat gate");
        Ok(GateDecision::Suppress)
    }

    fn is_expired(&self, last_updated: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(last_updated)
            .to_std()
            .map(|age| age > self.config.ttl)
            .unwrap_or(false)
    }
}
