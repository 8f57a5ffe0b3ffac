//! Client configuration.
//!
//! `ClientConfig` tells the core where the room service lives, which path
//! prefix the deployment uses, and where the local cache is kept.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DB_FILE: &str = "splitroom.db";

pub const ENV_API_BASE_URL: &str = "SPLITROOM_API_BASE_URL";
pub const ENV_API_PREFIX: &str = "SPLITROOM_API_PREFIX";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "SPLITROOM_HTTP_TIMEOUT_SECS";
pub const ENV_DB_PATH: &str = "SPLITROOM_DB_PATH";

/// Settings needed to reach the room service and open the cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Scheme, host and port of the room service, e.g. `http://10.0.0.2:8080`
    pub api_base_url: String,
    /// Path segment inserted before every API path (`/test` on staging)
    #[serde(default)]
    pub api_prefix: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl ClientConfig {
    /// Build a config for the given base URL with default settings.
    pub fn new(api_base_url: impl Into<String>) -> Result<Self> {
        Self {
            api_base_url: api_base_url.into(),
            api_prefix: None,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            db_path: None,
        }
        .normalized()
    }

    /// Set the API path prefix.
    #[must_use]
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = normalize_prefix(Some(prefix.into()));
        self
    }

    /// Read the config from `SPLITROOM_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the config through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_base_url = normalize_text_option(lookup(ENV_API_BASE_URL))
            .ok_or_else(|| Error::Config(format!("{ENV_API_BASE_URL} must be set")))?;

        let http_timeout_secs = match normalize_text_option(lookup(ENV_HTTP_TIMEOUT_SECS)) {
            Some(raw) => raw.parse().map_err(|_| {
                Error::Config(format!("{ENV_HTTP_TIMEOUT_SECS} must be a whole number, got {raw:?}"))
            })?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Self {
            api_base_url,
            api_prefix: lookup(ENV_API_PREFIX),
            http_timeout_secs,
            db_path: normalize_text_option(lookup(ENV_DB_PATH)).map(PathBuf::from),
        }
        .normalized()
    }

    /// Parse a config from JSON, validating it the same way as `from_env`.
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)?;
        config.normalized()
    }

    /// Request timeout for API calls.
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Cache location, falling back to `splitroom.db` in the working directory.
    pub fn db_path_or_default(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
    }

    /// Full URL for an API path, honouring the prefix.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}{}{}",
            self.api_base_url,
            self.api_prefix.as_deref().unwrap_or_default(),
            path
        )
    }

    fn normalized(mut self) -> Result<Self> {
        let base = normalize_text_option(Some(self.api_base_url))
            .ok_or_else(|| Error::Config("api_base_url must not be empty".to_string()))?;
        if !is_http_url(&base) {
            return Err(Error::Config(
                "api_base_url must include http:// or https://".to_string(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(Error::Config(
                "http_timeout_secs must be greater than zero".to_string(),
            ));
        }
        self.api_base_url = base.trim_end_matches('/').to_string();
        self.api_prefix = normalize_prefix(self.api_prefix);
        Ok(self)
    }
}

/// Trim a prefix to `/segment` form; empty or `/` means no prefix.
fn normalize_prefix(prefix: Option<String>) -> Option<String> {
    let prefix = normalize_text_option(prefix)?;
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}
