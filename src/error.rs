//! Error types for code-inbox.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Failures of a single provider call or of the rotation orchestrator.
///
/// `RateLimited`, `Status` and `Transport` are per-credential failures and are
/// recovered inside the orchestrator. Only `NoCredentials` and
/// `AllProvidersExhausted` ever leave `FailoverDispatcher::dispatch`.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Transport error talking to {provider}: {reason}")]
    Transport { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("No provider credentials configured")]
    NoCredentials,

    #[error("All providers exhausted after {attempts} call(s); last error: {last}")]
    AllProvidersExhausted { attempts: usize, last: Box<LlmError> },
}

impl LlmError {
    /// Whether this failure means the credential is over quota.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Failures of the retry controller.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("No provider credentials configured")]
    NoCredentials,

    #[error("Malformed model response: {0}")]
    Malformed(String),

    #[error("Extraction failed after {attempts} attempt(s): {last}")]
    Failed { attempts: u32, last: String },
}

/// Notification delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification to {target} failed: {reason}")]
    SendFailed { target: String, reason: String },

    #[error("Notification target {target} returned HTTP {status}")]
    Status { target: String, status: u16 },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
