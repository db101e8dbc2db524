//! Provider credentials and the time-based rotation cursor.

use chrono::{DateTime, Utc};
use secrecy::SecretString;

/// Which backend a credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Preferred backend; may carry several rotating keys.
    Primary,
    /// Paid fallback backend; at most one key.
    Secondary,
}

impl ProviderKind {
    /// Short label used in logs and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

/// A single API key tagged with its provider.
#[derive(Debug, Clone)]
pub struct Credential {
    kind: ProviderKind,
    secret: SecretString,
}

impl Credential {
    pub fn primary(secret: SecretString) -> Self {
        Self {
            kind: ProviderKind::Primary,
            secret,
        }
    }

    pub fn secondary(secret: SecretString) -> Self {
        Self {
            kind: ProviderKind::Secondary,
            secret,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }
}

/// Read-only view over the configured credentials.
#[derive(Debug, Clone, Default)]
pub struct CredentialPool {
    primaries: Vec<Credential>,
    secondary: Option<Credential>,
}

impl CredentialPool {
    pub fn new(primaries: Vec<Credential>, secondary: Option<Credential>) -> Self {
        Self {
            primaries,
            secondary,
        }
    }

    /// Primary credentials in configuration order.
    pub fn available_primaries(&self) -> &[Credential] {
        &self.primaries
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    pub fn secondary(&self) -> Option<&Credential> {
        self.secondary.as_ref()
    }

    /// No primary and no secondary credential.
    pub fn is_empty(&self) -> bool {
        self.primaries.is_empty() && self.secondary.is_none()
    }
}

/// Index of the primary credential to try first at `now`.
///
/// `floor(unix_minutes) mod count`. Every call within the same wall-clock
/// minute picks the same index. Returns `None` when `count` is zero.
pub fn rotation_cursor(now: DateTime<Utc>, count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    let minutes = now.timestamp().div_euclid(60) as u64;
    Some((minutes % count as u64) as usize)
}
