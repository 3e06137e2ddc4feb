use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

// Default configuration values
const DEFAULT_BASE_URL: &str = "https://api.kirkidata.com/api/v1";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_REFRESH_MAX_ATTEMPTS: usize = 3;
const DEFAULT_REFRESH_BACKOFF_MS: u64 = 250;
const DEFAULT_SESSION_FILE: &str = "kirkidata.session.json";

/// Configuration for the API client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Origin plus path prefix every endpoint is appended to
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (0 disables it)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Attempts at the refresh call before giving up on transient failures
    #[serde(default = "default_refresh_max_attempts")]
    pub refresh_max_attempts: usize,
    /// Base delay for the refresh backoff, in milliseconds
    #[serde(default = "default_refresh_backoff_ms")]
    pub refresh_backoff_ms: u64,
    /// Where the persisted sessions live
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
}

// Default functions
fn default_base_url() -> String {
    std::env::var("KIRKIDATA_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn default_request_timeout() -> u64 {
    std::env::var("KIRKIDATA_REQUEST_TIMEOUT_SECS")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS)
}

fn default_refresh_max_attempts() -> usize {
    std::env::var("KIRKIDATA_REFRESH_MAX_ATTEMPTS")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_REFRESH_MAX_ATTEMPTS)
}

fn default_refresh_backoff_ms() -> u64 {
    std::env::var("KIRKIDATA_REFRESH_BACKOFF_MS")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_REFRESH_BACKOFF_MS)
}

fn default_session_path() -> PathBuf {
    std::env::var("KIRKIDATA_SESSION_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SESSION_FILE))
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            refresh_max_attempts: default_refresh_max_attempts(),
            refresh_backoff_ms: default_refresh_backoff_ms(),
            session_path: default_session_path(),
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at `base_url`, everything else defaulted
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Build the configuration from the environment alone
    pub fn from_env() -> Result<Self> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file; missing fields fall back to
    /// their env-backed defaults
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let config: ClientConfig = serde_json::from_str(&config_str)?;
        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject configurations the client cannot work with
    pub fn validate(&self) -> Result<()> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(anyhow!("base_url must not be empty"));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(anyhow!("base_url must be an http(s) URL, got '{}'", base));
        }
        if self.refresh_max_attempts == 0 {
            return Err(anyhow!("refresh_max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    /// The request timeout, if one is configured
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}
