//! Client configuration
//!
//! Validated once at construction, before any transport is opened.

use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.schwabapi.com";

/// How often the supervisor asks the credential store to refresh
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on waiting for the supervisor to stop at scope exit
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request deadline for endpoint calls
    pub timeout: Duration,
    /// Background refresh check period
    pub refresh_interval: Duration,
    /// Share one transport across calls (rotated on refresh) instead of one per call
    pub use_shared_transport: bool,
    pub base_url: String,
    pub stop_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            use_shared_transport: true,
            base_url: DEFAULT_BASE_URL.to_owned(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::Config(
                "timeout must be greater than 0 (5 seconds or more is recommended)".into(),
            ));
        }
        if self.refresh_interval.is_zero() {
            return Err(Error::Config(
                "refresh_interval must be greater than 0".into(),
            ));
        }
        if self.stop_timeout.is_zero() {
            return Err(Error::Config("stop_timeout must be greater than 0".into()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.base_url
            )));
        }
        Ok(())
    }
}
