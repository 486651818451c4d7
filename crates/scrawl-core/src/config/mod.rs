//! Sync configuration shared by the CLI and any embedding client.
//!
//! Provides `SyncSettings`, the timing knobs of the sync engine, and helpers to
//! validate the remote endpoint a client talks to.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;
const DEFAULT_MAX_BACKOFF_SECS: u64 = 60;
const DEFAULT_PULL_INTERVAL_SECS: u64 = 30;
const DEFAULT_MAX_CONCURRENT_SENDS: usize = 4;

/// Tunables for the sync engine.
///
/// Every field has a default, so a partial JSON object is a valid config.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct SyncSettings {
    /// Upper bound on any single remote call
    pub request_timeout_secs: u64,
    /// First retry delay after a transient failure
    pub initial_backoff_ms: u64,
    /// Retry delay cap
    pub max_backoff_secs: u64,
    /// How often the running engine pulls while online
    pub pull_interval_secs: u64,
    /// Notes sent concurrently during one drain
    pub max_concurrent_sends: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            pull_interval_secs: DEFAULT_PULL_INTERVAL_SECS,
            max_concurrent_sends: DEFAULT_MAX_CONCURRENT_SENDS,
        }
    }
}

impl SyncSettings {
    /// Reject zero and inverted values.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.initial_backoff_ms == 0 {
            return Err(Error::InvalidInput(
                "initial_backoff_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_backoff().is_zero() || self.max_backoff() < self.initial_backoff() {
            return Err(Error::InvalidInput(
                "max_backoff_secs must be at least initial_backoff_ms".to_string(),
            ));
        }
        if self.pull_interval_secs == 0 {
            return Err(Error::InvalidInput(
                "pull_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_sends == 0 {
            return Err(Error::InvalidInput(
                "max_concurrent_sends must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub const fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub const fn pull_interval(&self) -> Duration {
        Duration::from_secs(self.pull_interval_secs)
    }
}

/// Normalize a remote API base URL: trimmed, http(s) scheme, no trailing slash.
pub fn normalize_api_base_url(raw: &str) -> Result<String> {
    let value = normalize_text_option(Some(raw.to_string()))
        .ok_or_else(|| Error::InvalidInput("API base URL is required".to_string()))?;
    if !is_http_url(&value) {
        return Err(Error::InvalidInput(format!(
            "API base URL '{value}' must include http:// or https://"
        )));
    }
    Ok(value.trim_end_matches('/').to_string())
}
