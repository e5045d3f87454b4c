//! Configuration loader and validator for the docsmith client.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

pub const TOKEN_ENV: &str = "DOCSMITH_TOKEN";
pub const DEFAULT_PATH: &str = "docsmith.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub api: Api,
    pub retry: Retry,
    pub export: Export,
}

/// Backend endpoint and credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    pub base_url: String,
    #[serde(default)]
    pub token: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

/// Retry policy applied by the workflow to each remote call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Retry {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Export {
    pub output_dir: String,
}

impl Config {
    /// Ensure required directories exist (creates `export.output_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(&self.export.output_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.export.output_dir)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_backoff_ms),
            Duration::from_millis(self.retry.max_backoff_ms),
        )
    }

    /// `DOCSMITH_TOKEN` wins over the file; blank means no credential.
    pub fn resolved_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| Some(self.api.token.clone()).filter(|t| !t.trim().is_empty()))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `docsmith.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_PATH));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let base = cfg.api.base_url.trim();
    if base.is_empty() {
        return Err(ConfigError::Invalid("api.base_url must be non-empty"));
    }
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ConfigError::Invalid("api.base_url must be an http(s) URL"));
    }
    if cfg.api.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("api.timeout_seconds must be > 0"));
    }
    if cfg.api.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("api.user_agent must be non-empty"));
    }

    if cfg.retry.max_attempts == 0 {
        return Err(ConfigError::Invalid("retry.max_attempts must be >= 1"));
    }
    if cfg.retry.max_backoff_ms < cfg.retry.initial_backoff_ms {
        return Err(ConfigError::Invalid(
            "retry.max_backoff_ms must be >= retry.initial_backoff_ms",
        ));
    }

    if cfg.export.output_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("export.output_dir must be non-empty"));
    }

    Ok(())
}

/// Example configuration written by `docsmith init-config`.
pub fn example() -> &'static str {
    r#"api:
  base_url: "http://localhost:8000/api/"
  # Leave empty and set DOCSMITH_TOKEN instead to keep the token out of the file.
  token: ""
  timeout_seconds: 60
  user_agent: "docsmith/0.1"

retry:
  max_attempts: 3
  initial_backoff_ms: 500
  max_backoff_ms: 8000

export:
  output_dir: "./exports"
"#
}
