//! Reporter configuration
//!
//! Values come from an optional TOML file and are then overridden by
//! `TESTRELAY_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

pub const ENV_API_KEY: &str = "TESTRELAY_API_KEY";
pub const ENV_PROJECT_ID: &str = "TESTRELAY_PROJECT_ID";
pub const ENV_RUN_ID: &str = "TESTRELAY_RUN_ID";
pub const ENV_BASE_URL: &str = "TESTRELAY_BASE_URL";
pub const ENV_TEST_TOOL: &str = "TESTRELAY_TEST_TOOL";
pub const ENV_BATCH_SIZE: &str = "TESTRELAY_BATCH_SIZE";
pub const ENV_TIMEOUT_MS: &str = "TESTRELAY_TIMEOUT_MS";
pub const ENV_MAX_FLUSH_ATTEMPTS: &str = "TESTRELAY_MAX_FLUSH_ATTEMPTS";
pub const ENV_RETRY_BACKOFF_MS: &str = "TESTRELAY_RETRY_BACKOFF_MS";

pub const DEFAULT_BASE_URL: &str = "https://api.testrelay.dev";

/// Path of the batch endpoint relative to the base URL
pub const BATCH_PATH: &str = "/reporter-events/batch";

/// Reporter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Bearer token for the collection endpoint
    pub api_key: Option<String>,

    /// Project the events belong to
    pub project_id: Option<String>,

    /// Explicit run title; the VCS branch is used when unset
    pub run_id: Option<String>,

    /// Collection endpoint base URL
    pub base_url: String,

    /// Name of the producing test tool (jest, playwright, ...)
    pub test_tool: Option<String>,

    /// Batching and retry
    pub delivery: DeliveryConfig,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            project_id: None,
            run_id: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            test_tool: None,
            delivery: DeliveryConfig::default(),
        }
    }
}

/// Delivery tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Messages per request; reaching it triggers an automatic flush
    pub batch_size: usize,

    /// Per-request timeout
    pub request_timeout_ms: u64,

    /// Total flush attempts before a batch is dropped
    pub max_flush_attempts: u32,

    /// Sleep between flush attempts
    pub retry_backoff_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            request_timeout_ms: 10_000,
            max_flush_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl DeliveryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl ReporterConfig {
    /// Credentials plus defaults for everything else
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            project_id: Some(project_id.into()),
            ..Default::default()
        }
    }

    /// Defaults overridden by the environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override fields with any `TESTRELAY_*` variables that are set
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var(ENV_API_KEY) {
            self.api_key = Some(v);
        }
        if let Some(v) = var(ENV_PROJECT_ID) {
            self.project_id = Some(v);
        }
        if let Some(v) = var(ENV_RUN_ID) {
            self.run_id = Some(v);
        }
        if let Some(v) = var(ENV_BASE_URL) {
            self.base_url = v;
        }
        if let Some(v) = var(ENV_TEST_TOOL) {
            self.test_tool = Some(v);
        }
        if let Some(v) = var(ENV_BATCH_SIZE) {
            self.delivery.batch_size = parse_number(ENV_BATCH_SIZE, &v)?;
        }
        if let Some(v) = var(ENV_TIMEOUT_MS) {
            self.delivery.request_timeout_ms = parse_number(ENV_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = var(ENV_MAX_FLUSH_ATTEMPTS) {
            self.delivery.max_flush_attempts = parse_number(ENV_MAX_FLUSH_ATTEMPTS, &v)?;
        }
        if let Some(v) = var(ENV_RETRY_BACKOFF_MS) {
            self.delivery.retry_backoff_ms = parse_number(ENV_RETRY_BACKOFF_MS, &v)?;
        }
        Ok(())
    }

    /// Reject configurations the pipeline cannot start with
    pub fn validate(&self) -> Result<()> {
        self.api_key()?;
        self.project_id()?;

        if self.base_url.trim().is_empty() {
            return Err(Error::InvalidConfig("base_url is empty".to_string()));
        }
        if self.delivery.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".to_string()));
        }
        if self.delivery.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig("request_timeout_ms must be positive".to_string()));
        }
        if self.delivery.max_flush_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_flush_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Non-blank API key
    pub fn api_key(&self) -> Result<&str> {
        non_blank(self.api_key.as_deref()).ok_or(Error::MissingApiKey)
    }

    /// Non-blank project id
    pub fn project_id(&self) -> Result<&str> {
        non_blank(self.project_id.as_deref()).ok_or(Error::MissingProjectId)
    }

    /// Full URL of the batch endpoint
    pub fn batch_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), BATCH_PATH)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{} is not a valid number: '{}'", key, value)))
}

/// `User-Agent` sent with every request
pub fn user_agent() -> String {
    format!("testrelay/{}", crate::VERSION)
}
