//! Rotation and failover across provider credentials.
//!
//! Order of calls for one `dispatch`:
//! 1. the primary credential picked by the rotation cursor,
//! 2. every other primary in configuration order,
//! 3. the secondary credential, if any.
//!
//! The first success wins. No credential is called twice per dispatch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::llm::credentials::{CredentialPool, rotation_cursor};
use crate::llm::provider::{NormalizedResponse, ProviderClient};

/// Routes one prompt through the credential pool.
pub struct FailoverDispatcher {
    client: Arc<dyn ProviderClient>,
    pool: CredentialPool,
}

impl FailoverDispatcher {
    pub fn new(client: Arc<dyn ProviderClient>, pool: CredentialPool) -> Self {
        Self { client, pool }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Dispatch using the current wall-clock minute for rotation.
    pub async fn dispatch(&self, prompt: &str) -> Result<NormalizedResponse, LlmError> {
        self.dispatch_at(prompt, Utc::now()).await
    }

    /// Dispatch as if the current time were `now`.
    pub async fn dispatch_at(
        &self,
        prompt: &str,
        now: DateTime<Utc>,
    ) -> Result<NormalizedResponse, LlmError> {
        if self.pool.is_empty() {
            return Err(LlmError::NoCredentials);
        }

        let primaries = self.pool.available_primaries();
        let mut attempts = 0usize;
        let mut last_error = None;

        if let Some(start) = rotation_cursor(now, primaries.len()) {
            let order =
                std::iter::once(start).chain((0..primaries.len()).filter(move |&i| i != start));

            for index in order {
                attempts += 1;
                match self.client.call(prompt, &primaries[index]).await {
                    Ok(response) => {
                        debug!(index, attempts, "primary credential succeeded");
                        return Ok(response);
                    }
                    Err(e) => {
                        warn!(
                            index,
                            rate_limited = e.is_rate_limited(),
                            error = %e,
                            "primary credential failed"
                        );
                        last_error = Some(e);
                    }
                }
            }
        }

        if let Some(secondary) = self.pool.secondary() {
            attempts += 1;
            if !primaries.is_empty() {
                info!(
                    primaries = primaries.len(),
                    "all primary credentials failed, escalating to secondary provider"
                );
            }
            match self.client.call(prompt, secondary).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(error = %e, "secondary provider failed");
                    last_error = Some(e);
                }
            }
        }

        Err(LlmError::AllProvidersExhausted {
            attempts,
            last: Box::new(last_error.unwrap_or(LlmError::NoCredentials)),
        })
    }

    /// One direct call to the secondary provider, bypassing rotation.
    ///
    /// Returns `NoCredentials` without any network call when no secondary
    /// credential is configured.
    pub async fn call_secondary(&self, prompt: &str) -> Result<NormalizedResponse, LlmError> {
        match self.pool.secondary() {
            Some(credential) => self.client.call(prompt, credential).await,
            None => Err(LlmError::NoCredentials),
        }
    }
}
