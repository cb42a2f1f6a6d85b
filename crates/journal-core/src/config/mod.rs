//! Remote sync configuration.
//!
//! Loaded from a JSON file, with `JOURNAL_REMOTE_URL` and `JOURNAL_AUTH_TOKEN`
//! taking precedence over the file values.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::{Backoff, SyncTimeouts};
use crate::util::{is_http_url, normalize_text_option};

pub const REMOTE_URL_ENV: &str = "JOURNAL_REMOTE_URL";
pub const AUTH_TOKEN_ENV: &str = "JOURNAL_AUTH_TOKEN";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_PASS_TIMEOUT_SECS: u64 = 300;
const DEFAULT_RETRY_BASE_SECS: u64 = 30;
const DEFAULT_MAX_BACKOFF_SECS: u64 = 3600;

/// Where and how to reach the remote entry service.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_pass_timeout_secs")]
    pub pass_timeout_secs: u64,
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            auth_token: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            pass_timeout_secs: DEFAULT_PASS_TIMEOUT_SECS,
            retry_base_secs: DEFAULT_RETRY_BASE_SECS,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
        }
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("pass_timeout_secs", &self.pass_timeout_secs)
            .field("retry_base_secs", &self.retry_base_secs)
            .field("max_backoff_secs", &self.max_backoff_secs)
            .finish()
    }
}

impl RemoteConfig {
    /// Load from `path` if it exists, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            Self::load_from_path(path)?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Parse a config file without environment overrides
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let payload = std::fs::read_to_string(path)?;
        Self::parse(&payload)
    }

    /// Parse a JSON payload
    pub fn parse(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid remote config JSON: {error}")))
    }

    /// Apply overrides from a variable lookup
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = normalize_text_option(lookup(REMOTE_URL_ENV)) {
            self.base_url = Some(url);
        }
        if let Some(token) = normalize_text_option(lookup(AUTH_TOKEN_ENV)) {
            self.auth_token = Some(token);
        }
        self
    }

    /// Normalized base URL; errors when missing or not http(s)
    pub fn remote_url(&self) -> Result<String> {
        let url = normalize_text_option(self.base_url.clone()).ok_or_else(|| {
            Error::Config(format!(
                "remote base_url is not configured (set it in the config file or {REMOTE_URL_ENV})"
            ))
        })?;
        if !is_http_url(&url) {
            return Err(Error::Config(
                "remote base_url must include http:// or https://".to_string(),
            ));
        }
        Ok(url.trim_end_matches('/').to_string())
    }

    /// Check the values a sync run depends on
    pub fn validate(&self) -> Result<()> {
        self.remote_url()?;
        for (field, value) in [
            ("request_timeout_secs", self.request_timeout_secs),
            ("pass_timeout_secs", self.pass_timeout_secs),
            ("max_backoff_secs", self.max_backoff_secs),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{field} must be greater than zero")));
            }
        }
        Ok(())
    }

    pub const fn timeouts(&self) -> SyncTimeouts {
        SyncTimeouts {
            request: Duration::from_secs(self.request_timeout_secs),
            pass: Duration::from_secs(self.pass_timeout_secs),
        }
    }

    pub const fn backoff(&self) -> Backoff {
        Backoff {
            retry_base: Duration::from_secs(self.retry_base_secs),
            max: Duration::from_secs(self.max_backoff_secs),
        }
    }
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_pass_timeout_secs() -> u64 {
    DEFAULT_PASS_TIMEOUT_SECS
}

const fn default_retry_base_secs() -> u64 {
    DEFAULT_RETRY_BASE_SECS
}

const fn default_max_backoff_secs() -> u64 {
    DEFAULT_MAX_BACKOFF_SECS
}
