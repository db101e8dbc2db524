//! Inbound email processing.
//!
//! Every forwarded email flows through [`intake::EmailIntake::process`]:
//! dedupe → persist raw → prompt → extract → repeat gate → persist code →
//! notify. Failures never escape; they end up as an [`IntakeOutcome`].

pub mod gate;
pub mod intake;
pub mod prompt;
pub mod retention;
pub mod types;

pub use gate::{GateConfig, GateDecision, RepeatGate};
pub use intake::EmailIntake;
pub use retention::{RetentionWindows, spawn_retention_sweep};
pub use types::{InboundEmail, IntakeOutcome};
