//! Background deletion of old codes, raw messages and stale gate records.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::store::Database;

/// How long each kind of row is kept.
#[derive(Debug, Clone, Copy)]
pub struct RetentionWindows {
    pub codes: Duration,
    /// Also the idempotency horizon: a redelivery older than this is processed again.
    pub raw_messages: Duration,
    pub gate_records: Duration,
}

/// `now - age`, or `None` when the window reaches past the representable range.
fn cutoff(now: DateTime<Utc>, age: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
}

/// Delete every row older than its window.
pub async fn sweep_once(db: &dyn Database, windows: RetentionWindows) {
    let now = Utc::now();

    if let Some(before) = cutoff(now, windows.codes) {
        match db.prune_codes(before).await {
            Ok(0) => {}
            Ok(n) => info!(deleted = n, "pruned expired codes"),
            Err(e) => warn!(error = %e, "code retention sweep failed"),
        }
    }

    if let Some(before) = cutoff(now, windows.raw_messages) {
        match db.prune_raw_messages(before).await {
            Ok(0) => {}
            Ok(n) => info!(deleted = n, "pruned old raw messages"),
            Err(e) => warn!(error = %e, "raw message sweep failed"),
        }
    }

    if let Some(before) = cutoff(now, windows.gate_records) {
        match db.prune_gate_records(before).await {
            Ok(0) => {}
            Ok(n) => info!(deleted = n, "pruned stale gate records"),
            Err(e) => warn!(error = %e, "gate record sweep failed"),
        }
    }
}

/// Spawn a background task that sweeps every `interval`.
pub fn spawn_retention_sweep(
    db: Arc<dyn Database>,
    windows: RetentionWindows,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        loop {
            interval.tick().await;
            sweep_once(db.as_ref(), windows).await;
        }
    })
}
