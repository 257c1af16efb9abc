//! Uploader configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/appvault/uploader.toml`
//! - Windows: `%APPDATA%/appvault/uploader.toml`
//!
//! A missing file yields defaults and is not written back.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use appvault_protocol::constants::{
    CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SERVER_URL,
};
use appvault_uploader::{RetryPolicy, UploadOptions};
use serde::{Deserialize, Serialize};

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the version server.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Value of the `X-API-Key` header (empty = no header).
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Uploads above this size are rejected locally.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Chunk retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            backoff_factor: policy.backoff_factor,
        }
    }
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.into()
}

fn default_chunk_size() -> u64 {
    CHUNK_SIZE
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            api_key: String::new(),
            chunk_size: default_chunk_size(),
            max_file_size: default_max_file_size(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Loads `path`, or the platform config file when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load_from(p),
            None => Self::load_from(&config_path()?),
        }
    }

    /// Loads configuration from `path`, falling back to defaults if absent.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Applies command-line / environment overrides.
    pub fn apply_overrides(&mut self, server_url: Option<String>, api_key: Option<String>) {
        if let Some(url) = server_url {
            self.server_url = url;
        }
        if let Some(key) = api_key {
            self.api_key = key;
        }
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            chunk_size: self.chunk_size,
            max_file_size: self.max_file_size,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_factor: self.retry.backoff_factor,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Copy safe to print: the API key is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.api_key.is_empty() {
            copy.api_key = "********".into();
        }
        copy
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").context("APPDATA is not set")?;
        Ok(PathBuf::from(appdata).join("appvault").join("uploader.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("appvault")
            .join("uploader.toml"))
    }
}
