//! Retry controller for extraction attempts with linear backoff.
//!
//! Each attempt dispatches through [`FailoverDispatcher`], then parses and
//! validates the candidate text. Attempt `n` that fails (call or parse) waits
//! `backoff_base * (n + 1)` before attempt `n + 1`. No wait follows the last
//! attempt.
//!
//! Independently of the dispatcher's own escalation, an attempt whose
//! dispatch fails may make one more direct call to the secondary provider.
//! [`SecondaryFallbackPolicy`] decides which attempts get that extra call.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{ExtractionError, LlmError};
use crate::extraction::{ExtractionResult, parse_response};
use crate::llm::failover::FailoverDispatcher;
use crate::llm::provider::NormalizedResponse;

/// Which attempts get the extra direct secondary-provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecondaryFallbackPolicy {
    /// Only attempt 0.
    #[default]
    FirstAttemptOnly,
    EveryAttempt,
    Never,
}

impl SecondaryFallbackPolicy {
    fn applies_to(&self, attempt: u32) -> bool {
        match self {
            Self::FirstAttemptOnly => attempt == 0,
            Self::EveryAttempt => true,
            Self::Never => false,
        }
    }
}

impl FromStr for SecondaryFallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "first_attempt" | "first-attempt" => Ok(Self::FirstAttemptOnly),
            "every" | "always" => Ok(Self::EveryAttempt),
            "never" | "off" => Ok(Self::Never),
            other => Err(format!(
                "unknown secondary fallback policy '{other}' (expected first, every or never)"
            )),
        }
    }
}

/// Retry loop settings.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, at least 1.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub secondary_fallback: SecondaryFallbackPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            secondary_fallback: SecondaryFallbackPolicy::FirstAttemptOnly,
        }
    }
}

/// Wait after failed attempt `attempt`. Saturates instead of overflowing.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt.saturating_add(1))
}

/// Turns a prompt into a validated [`ExtractionResult`].
pub struct Extractor {
    dispatcher: Arc<FailoverDispatcher>,
    config: RetryConfig,
}

impl Extractor {
    pub fn new(dispatcher: Arc<FailoverDispatcher>, config: RetryConfig) -> Self {
        Self { dispatcher, config }
    }

    pub async fn extract(&self, prompt: &str) -> Result<ExtractionResult, ExtractionError> {
        let max = self.config.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..max {
            let outcome = match self.call(prompt, attempt).await {
                Ok(response) => {
                    debug!(
                        attempt,
                        provider = response.provider.label(),
                        "model response received"
                    );
                    parse_response(&response.text)
                }
                Err(LlmError::NoCredentials) => return Err(ExtractionError::NoCredentials),
                Err(e) => Err(ExtractionError::Failed {
                    attempts: attempt + 1,
                    last: e.to_string(),
                }),
            };

            match outcome {
                Ok(result) => {
                    if attempt > 0 {
                        info!(attempt, "extraction succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(e) => {
                    warn!(attempt, max, error = %e, "extraction attempt failed");
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < max {
                tokio::time::sleep(backoff_delay(self.config.backoff_base, attempt)).await;
            }
        }

        error!(attempts = max, last_error = %last_error, "extraction exhausted retries");
        Err(ExtractionError::Failed {
            attempts: max,
            last: last_error,
        })
    }

    /// Dispatch, plus the per-policy secondary safety net on failure.
    async fn call(&self, prompt: &str, attempt: u32) -> Result<NormalizedResponse, LlmError> {
        match self.dispatcher.dispatch(prompt).await {
            Ok(response) => Ok(response),
            Err(LlmError::NoCredentials) => Err(LlmError::NoCredentials),
            Err(e)
                if self.dispatcher.pool().has_secondary()
                    && self.config.secondary_fallback.applies_to(attempt) =>
            {
                warn!(attempt, error = %e, "dispatch failed, trying secondary provider directly");
                self.dispatcher.call_secondary(prompt).await
            }
            Err(e) => Err(e),
        }
    }
}
