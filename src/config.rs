//! Configuration types, built once from environment variables at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::credentials::{Credential, CredentialPool};
use crate::llm::retry::{RetryConfig, SecondaryFallbackPolicy};
use crate::pipeline::gate::GateConfig;
use crate::pipeline::retention::RetentionWindows;

const DEFAULT_PRIMARY_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_PRIMARY_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_SECONDARY_MODEL: &str = "gpt-4o-mini";
const DEFAULT_SECONDARY_BASE_URL: &str = "https://api.openai.com/v1";

/// Endpoint settings for both provider adapters.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub primary_model: String,
    pub primary_base_url: String,
    pub secondary_model: String,
    pub secondary_base_url: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            primary_model: DEFAULT_PRIMARY_MODEL.to_string(),
            primary_base_url: DEFAULT_PRIMARY_BASE_URL.to_string(),
            secondary_model: DEFAULT_SECONDARY_MODEL.to_string(),
            secondary_base_url: DEFAULT_SECONDARY_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Push-notification settings.
#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    pub enabled: bool,
    /// One URL per notification target.
    pub targets: Vec<String>,
}

/// Full process configuration. Immutable after load.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: CredentialPool,
    pub providers: ProviderConfig,
    pub retry: RetryConfig,
    pub gate: GateConfig,
    pub notify: NotifyConfig,
    pub db_path: PathBuf,
    pub port: u16,
    /// How long extracted codes are kept before the sweep deletes them.
    pub retention: Duration,
    /// How long raw messages, and with them duplicate detection, are kept.
    pub raw_retention: Duration,
    pub sweep_interval: Duration,
}

impl AppConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let primaries: Vec<Credential> = split_list(get("CODE_INBOX_PRIMARY_KEYS").as_deref())
            .into_iter()
            .map(|key| Credential::primary(SecretString::from(key)))
            .collect();
        let secondary = get("CODE_INBOX_SECONDARY_KEY")
            .map(|key| Credential::secondary(SecretString::from(key)));
        let credentials = CredentialPool::new(primaries, secondary);

        let defaults = ProviderConfig::default();
        let providers = ProviderConfig {
            primary_model: get("CODE_INBOX_PRIMARY_MODEL").unwrap_or(defaults.primary_model),
            primary_base_url: get("CODE_INBOX_PRIMARY_BASE_URL")
                .unwrap_or(defaults.primary_base_url),
            secondary_model: get("CODE_INBOX_SECONDARY_MODEL").unwrap_or(defaults.secondary_model),
            secondary_base_url: get("CODE_INBOX_SECONDARY_BASE_URL")
                .unwrap_or(defaults.secondary_base_url),
            request_timeout: Duration::from_secs(parse_or(
                get("CODE_INBOX_REQUEST_TIMEOUT_SECS"),
                "CODE_INBOX_REQUEST_TIMEOUT_SECS",
                30u64,
            )?),
        };

        let max_retries: u32 =
            parse_or(get("CODE_INBOX_MAX_RETRIES"), "CODE_INBOX_MAX_RETRIES", 3)?;
        if max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CODE_INBOX_MAX_RETRIES".into(),
                message: "must be at least 1".into(),
            });
        }
        let retry = RetryConfig {
            max_retries,
            backoff_base: Duration::from_millis(parse_or(
                get("CODE_INBOX_BACKOFF_MS"),
                "CODE_INBOX_BACKOFF_MS",
                1000u64,
            )?),
            secondary_fallback: parse_or(
                get("CODE_INBOX_SECONDARY_FALLBACK"),
                "CODE_INBOX_SECONDARY_FALLBACK",
                SecondaryFallbackPolicy::FirstAttemptOnly,
            )?,
        };

        let threshold: u32 =
            parse_or(get("CODE_INBOX_GATE_THRESHOLD"), "CODE_INBOX_GATE_THRESHOLD", 3)?;
        if threshold == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CODE_INBOX_GATE_THRESHOLD".into(),
                message: "must be at least 1".into(),
            });
        }
        let gate = GateConfig {
            threshold,
            ttl: scaled_secs(
                parse_or(
                    get("CODE_INBOX_GATE_TTL_MINUTES"),
                    "CODE_INBOX_GATE_TTL_MINUTES",
                    30u64,
                )?,
                60,
                "CODE_INBOX_GATE_TTL_MINUTES",
            )?,
        };

        let notify = NotifyConfig {
            enabled: parse_bool(get("CODE_INBOX_NOTIFY"), "CODE_INBOX_NOTIFY")?,
            targets: split_list(get("CODE_INBOX_NOTIFY_TARGETS").as_deref()),
        };
        if notify.enabled && notify.targets.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "CODE_INBOX_NOTIFY_TARGETS".into(),
                hint: "Set at least one target URL or disable CODE_INBOX_NOTIFY.".into(),
            });
        }

        Ok(Self {
            credentials,
            providers,
            retry,
            gate,
            notify,
            db_path: get("CODE_INBOX_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/code-inbox.db")),
            port: parse_or(get("CODE_INBOX_PORT"), "CODE_INBOX_PORT", 8080)?,
            retention: scaled_secs(
                parse_or(
                    get("CODE_INBOX_RETENTION_HOURS"),
                    "CODE_INBOX_RETENTION_HOURS",
                    24u64,
                )?,
                3600,
                "CODE_INBOX_RETENTION_HOURS",
            )?,
            raw_retention: scaled_secs(
                parse_or(
                    get("CODE_INBOX_RAW_RETENTION_HOURS"),
                    "CODE_INBOX_RAW_RETENTION_HOURS",
                    168u64,
                )?,
                3600,
                "CODE_INBOX_RAW_RETENTION_HOURS",
            )?,
            sweep_interval: Duration::from_secs(parse_or(
                get("CODE_INBOX_SWEEP_INTERVAL_SECS"),
                "CODE_INBOX_SWEEP_INTERVAL_SECS",
                600u64,
            )?),
        })
    }

    /// Windows the retention sweep prunes against.
    pub fn retention_windows(&self) -> RetentionWindows {
        RetentionWindows {
            codes: self.retention,
            raw_messages: self.raw_retention,
            gate_records: self.gate.ttl,
        }
    }
}

/// Split a comma-separated list, dropping blanks.
fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{value:?}: {e}"),
        }),
    }
}

/// `value` units of `unit_secs` seconds each, rejecting overflow.
fn scaled_secs(value: u64, unit_secs: u64, key: &str) -> Result<Duration, ConfigError> {
    value
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{value} is too large"),
        })
}

fn parse_bool(raw: Option<String>, key: &str) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{other:?} is not a boolean"),
        }),
    }
}
