//! Engine configuration
//!
//! Loaded from an optional JSON file, then overridden from the process
//! environment (`DATA_DIR`, `EXECUTION_TIMEOUT`, `BASE_URL`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::functions::scheduler::{parse_schedule, DEFAULT_SCHEDULE};
use crate::functions::RuntimeConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the JSON stores
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Wall-clock limit for one invocation
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_secs: u64,

    /// Exposed to guests as `ctx.baseUrl`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Cron expression for the retention sweep
    #[serde(default = "default_housekeeping_schedule")]
    pub housekeeping_schedule: String,

    /// Per-request timeout of the outbound HTTP client
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_execution_timeout() -> u64 {
    300
}
fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_housekeeping_schedule() -> String {
    DEFAULT_SCHEDULE.to_string()
}
fn default_http_timeout() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            execution_timeout_secs: default_execution_timeout(),
            base_url: default_base_url(),
            housekeeping_schedule: default_housekeeping_schedule(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

impl EngineConfig {
    /// Load from `path` (or defaults when absent), apply environment
    /// overrides and validate
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply `DATA_DIR`, `EXECUTION_TIMEOUT` and `BASE_URL` from `lookup`
    ///
    /// Empty values are ignored; an unparsable timeout keeps the current one.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = lookup("DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("EXECUTION_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
            self.execution_timeout_secs = secs;
        }
        if let Some(url) = lookup("BASE_URL") {
            self.base_url = url;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.execution_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "execution_timeout_secs must be > 0".into(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid("http_timeout_secs must be > 0".into()));
        }
        parse_schedule(&self.housekeeping_schedule)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    pub fn runtime(&self) -> RuntimeConfig {
        RuntimeConfig {
            timeout: Duration::from_secs(self.execution_timeout_secs),
            base_url: self.base_url.clone(),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Functions, versions and executions
    pub fn functions_path(&self) -> PathBuf {
        self.data_dir.join("functions.json")
    }

    pub fn kv_path(&self) -> PathBuf {
        self.data_dir.join("kv.json")
    }

    pub fn env_path(&self) -> PathBuf {
        self.data_dir.join("env.json")
    }
}
