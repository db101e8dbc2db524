//! LLM integration for code extraction.
//!
//! Two backends:
//! - **Primary**: `generateContent`-style API, several rotating keys
//! - **Secondary**: OpenAI-compatible chat completions, one key, used only
//!   after every primary key has failed for a call
//!
//! Layering, leaves first: [`credentials`] → [`provider`] (one HTTP call) →
//! [`failover`] (rotation and escalation) → [`retry`] (bounded attempts plus
//! response validation).

pub mod credentials;
pub mod failover;
mod gemini;
mod openai;
pub mod provider;
pub mod retry;

pub use credentials::{Credential, CredentialPool, ProviderKind};
pub use failover::FailoverDispatcher;
pub use provider::{HttpProviderClient, NormalizedResponse, ProviderClient};
pub use retry::{Extractor, RetryConfig, SecondaryFallbackPolicy};
