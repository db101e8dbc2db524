//! Shared types for the intake pipeline.

use serde::{Deserialize, Serialize};

// ── Inbound email ───────────────────────────────────────────────────

/// One email delivered by the forwarding hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEmail {
    /// Upstream message identifier, used for idempotency.
    pub message_id: String,
    /// Envelope sender.
    pub from: String,
    /// Envelope recipient.
    pub to: String,
    /// Full RFC 5322 message text.
    pub raw: String,
}

impl InboundEmail {
    /// Key the repeat gate counts under.
    pub fn gate_key(&self) -> String {
        self.to.trim().to_ascii_lowercase()
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// What the pipeline did with one email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// This message id was already processed.
    Duplicate,
    /// The raw message could not be persisted. The sender should retry.
    Rejected,
    NoCode,
    /// Extraction exhausted retries or had no credentials.
    ExtractionFailed,
    /// Held back by the repeat gate.
    Suppressed,
    /// A code was released but could not be persisted. Nobody is notified.
    NotSaved,
    /// Code persisted. `notified` counts targets that accepted the push.
    Stored { notified: usize },
}

impl IntakeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Rejected => "rejected",
            Self::NoCode => "no_code",
            Self::ExtractionFailed => "extraction_failed",
            Self::Suppressed => "suppressed",
            Self::NotSaved => "not_saved",
            Self::Stored { .. } => "stored",
        }
    }

    /// Whether the upstream sender should be told to retry.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_key_is_normalized_recipient() {
        let email = InboundEmail {
            message_id: "m".into(),
            from: "a@b.c".into(),
            to: "  Me@Inbox.DEV ".into(),
            raw: String::new(),
        };
        assert_eq!(email.gate_key(), "me@inbox.dev");
    }

    #[test]
    fn only_rejected_signals_retry() {
        assert!(IntakeOutcome::Rejected.is_rejected());
        assert!(!IntakeOutcome::Duplicate.is_rejected());
        assert!(!IntakeOutcome::Stored { notified: 0 }.is_rejected());
        assert_eq!(IntakeOutcome::Stored { notified: 2 }.label(), "stored");
    }
}
