//! Configuration loaded from `multiscribe.toml`.
//!
//! [`AppConfig`] holds every tunable parameter. Missing keys fall back to
//! sensible defaults, and `OPENAI_API_KEY` / `DEEPGRAM_API_KEY` take
//! precedence over the keys written in the file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "multiscribe.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub deepgram: ProviderConfig,
}

/// HTTP listener and upload handling.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Where uploads are spooled while their job runs. Defaults to the system temp dir.
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,

    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

/// Job lifecycle timings, all in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// How long a finished job stays queryable.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Upper bound for a single provider call; a slower provider is recorded as failed.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
}

/// Credentials and endpoint for one transcription back-end.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,

    /// Override of the back-end's endpoint URL.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Default model when a job does not pick one.
    #[serde(default)]
    pub model: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_mb() -> usize {
    100
}

// One hour, both for retention and for the sweep cadence.
fn default_retention_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_provider_timeout_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upload_dir: None,
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            provider_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

impl JobsConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

impl ServerConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl AppConfig {
    /// Load the configuration from `path`, using defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<AppConfig>(&contents)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Environment variables take precedence over the file for API keys.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.openai.api_key = key;
        }
        if let Some(key) = lookup("DEEPGRAM_API_KEY").filter(|k| !k.is_empty()) {
            self.deepgram.api_key = key;
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.server.port == 0 {
            return Err(AppError::Config("server.port must be non-zero".into()));
        }
        if self.server.max_upload_mb == 0 {
            return Err(AppError::Config("server.max_upload_mb must be non-zero".into()));
        }
        if self.jobs.sweep_interval_secs == 0 {
            return Err(AppError::Config("jobs.sweep_interval_secs must be non-zero".into()));
        }
        if self.jobs.provider_timeout_secs == 0 {
            return Err(AppError::Config("jobs.provider_timeout_secs must be non-zero".into()));
        }
        Ok(())
    }
}
