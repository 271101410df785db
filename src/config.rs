//! Configuration loading.
//!
//! Configuration is loaded from a TOML file with the following resolution order:
//! 1. `--config <path>` (CLI flag; must exist)
//! 2. `~/.huginn/config.toml` (user)
//! 3. built-in defaults
//!
//! Environment variables are applied on top of whichever file was used:
//!
//! | variable | setting |
//! |---|---|
//! | `LLM_MODEL` | `model.model` |
//! | `LLM_BASE_URL` | `model.base_url` |
//! | `LLM_TEMPERATURE` | `model.temperature` |
//! | `LLM_TIMEOUT` | `model.timeout_secs` |
//! | `CACHE_EXPIRY_HOURS` | `cache.expiry_hours` |
//! | `MAX_CACHE_SIZE_MB` | `cache.max_size_mb` |
//! | `MAX_RETRIES` | `retry.max_retries` |
//! | `HUGINN_CACHE_DIR` | `cache.dir` |

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::{CacheConfig, HuginnError, Result, RetryConfig};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Model endpoint and sampling settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelSettings {
    /// Model identifier; also the cache namespace (default: `ollama/mistral`).
    #[serde(default = "default_model")]
    pub model: String,
    /// Model server URL (default: `http://localhost:11434`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Sampling temperature; part of every cache key (default: 0.2).
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Per-request timeout in seconds (default: 120).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "ollama/mistral".to_string()
}

fn default_base_url() -> String {
    crate::providers::ollama::DEFAULT_BASE_URL.to_string()
}

fn default_temperature() -> f64 {
    0.2
}

fn default_timeout() -> u64 {
    120
}

/// Persistent cache settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CacheSettings {
    /// Directory for `cache.json` and `profile.json` (default: `.cache`).
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Liveness window in hours (default: 24).
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: u64,
    /// Size of `cache.json` in MB that triggers pruning (default: 100).
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            expiry_hours: default_expiry_hours(),
            max_size_mb: default_max_size_mb(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache")
}

fn default_expiry_hours() -> u64 {
    24
}

fn default_max_size_mb() -> u64 {
    100
}

/// Retry settings for model calls.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per call, first one included (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff base unit in milliseconds (default: 1000).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

impl Config {
    /// Load configuration from the standard locations, then apply
    /// environment overrides and validate.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path. `None` means "use defaults".
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        Ok(dirs::home_dir()
            .map(|home| home.join(".huginn").join("config.toml"))
            .filter(|p| p.exists()))
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LLM_MODEL") {
            self.model.model = v;
        }
        if let Some(v) = lookup("LLM_BASE_URL") {
            self.model.base_url = v;
        }
        if let Some(v) = lookup("LLM_TEMPERATURE") {
            self.model.temperature = parse_env("LLM_TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("LLM_TIMEOUT") {
            self.model.timeout_secs = parse_env("LLM_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("CACHE_EXPIRY_HOURS") {
            self.cache.expiry_hours = parse_env("CACHE_EXPIRY_HOURS", &v)?;
        }
        if let Some(v) = lookup("MAX_CACHE_SIZE_MB") {
            self.cache.max_size_mb = parse_env("MAX_CACHE_SIZE_MB", &v)?;
        }
        if let Some(v) = lookup("MAX_RETRIES") {
            self.retry.max_retries = parse_env("MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("HUGINN_CACHE_DIR") {
            self.cache.dir = PathBuf::from(v);
        }
        Ok(())
    }

    /// Reject settings the rest of the crate cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.model.model.trim().is_empty() {
            return Err(HuginnError::Configuration("model must not be empty".into()));
        }
        if !self.model.temperature.is_finite() || self.model.temperature < 0.0 {
            return Err(HuginnError::Configuration(format!(
                "temperature must be a non-negative number, got {}",
                self.model.temperature
            )));
        }
        if self.model.timeout_secs == 0 {
            return Err(HuginnError::Configuration(
                "timeout_secs must be at least 1".into(),
            ));
        }
        if self.cache.expiry_hours == 0 {
            return Err(HuginnError::Configuration(
                "expiry_hours must be at least 1".into(),
            ));
        }
        if self.retry.max_retries == 0 {
            return Err(HuginnError::Configuration(
                "max_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Cache manager configuration derived from `[cache]`.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(self.cache.dir.clone())
            .expiry_hours(self.cache.expiry_hours)
            .max_size_mb(self.cache.max_size_mb)
    }

    /// Retry configuration derived from `[retry]`.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.retry.max_retries)
            .backoff_unit(Duration::from_millis(self.retry.backoff_ms))
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|e| {
        HuginnError::Configuration(format!("invalid value {value:?} for {name}: {e}"))
    })
}
