//! Bearer token snapshots and refresh outcomes

use std::fmt;
use std::time::Duration;

use common::Secret;

use crate::credentials::TokenFile;
use crate::error::Error;

/// Read-only snapshot of the current access token.
///
/// `expires_at` is a unix timestamp in milliseconds. Cloning is cheap enough
/// to hand one snapshot to every outbound request.
#[derive(Clone)]
pub struct BearerToken {
    value: Secret<String>,
    expires_at: u64,
}

impl BearerToken {
    pub fn new(value: impl Into<String>, expires_at: u64) -> Self {
        Self {
            value: Secret::new(value.into()),
            expires_at,
        }
    }

    /// Expose the raw token (use sparingly)
    pub fn expose(&self) -> &str {
        self.value.expose()
    }

    /// `Authorization` header value.
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.value.expose())
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        self.expires_at <= now_millis
    }

    /// Whether the token expires within `window` of `now_millis`.
    pub fn expires_within(&self, window: Duration, now_millis: u64) -> bool {
        self.expires_at <= now_millis.saturating_add(window.as_millis() as u64)
    }
}

impl From<&TokenFile> for BearerToken {
    fn from(file: &TokenFile) -> Self {
        Self::new(file.token.access_token.clone(), file.access_expires_at())
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("value", &self.value)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Result of one `refresh_if_needed` check.
///
/// `Failed` is deliberately separate from `NoActionNeeded`: the held token is
/// still the previous one, but it was due for rotation and could not be rotated.
#[derive(Debug)]
pub enum RefreshOutcome {
    NoActionNeeded,
    Rotated,
    Failed(Error),
}

impl RefreshOutcome {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::NoActionNeeded => "no_action",
            RefreshOutcome::Rotated => "rotated",
            RefreshOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_rotated(&self) -> bool {
        matches!(self, RefreshOutcome::Rotated)
    }
}
