//! Configuration management

use std::{path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::{Error, Result};

/// Environment variable prefix, nested keys are separated by `__`
/// (e.g. `PODCAST_FAILSAFE_FAILSAFE__RETRY__MAX_ATTEMPTS=5`).
pub const ENV_PREFIX: &str = "PODCAST_FAILSAFE_";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Failsafe configuration (circuit breaker + retry)
    pub failsafe: FailsafeConfig,
    /// Cache configuration
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or holds values rejected by [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        tracing::debug!(?path, "Configuration loaded");

        Ok(config)
    }

    /// Check every section for illegal values
    pub fn validate(&self) -> Result<()> {
        self.failsafe.circuit_breaker.validate()?;
        self.failsafe.retry.validate()?;
        self.cache.validate()
    }
}

/// Failsafe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct FailsafeConfig {
    /// Circuit breaker configuration
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry configuration
    pub retry: RetryConfig,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable circuit breaker
    pub enabled: bool,
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Consecutive successes in half-open before closing
    pub success_threshold: u32,
    /// Per-call timeout hint for wrapped operations (not enforced here)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Cool-down before an open circuit admits a probe
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
    /// Error kinds that propagate instead of triggering a fallback
    pub ignored_error_kinds: Vec<ErrorKind>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
            ignored_error_kinds: Vec::new(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Reject thresholds that could never be reached or are always reached
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold < 1 {
            return Err(Error::Config(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.success_threshold < 1 {
            return Err(Error::Config(
                "circuit_breaker.success_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether an error of `kind` should fall through to the caller
    #[must_use]
    pub fn is_ignored(&self, kind: ErrorKind) -> bool {
        self.ignored_error_kinds.contains(&kind)
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries (disabled means a single attempt)
    pub enabled: bool,
    /// Maximum attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Maximum computed delay (before jitter)
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Error kinds worth retrying; empty retries every error
    pub retryable_kinds: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            retryable_kinds: Vec::new(),
        }
    }
}

impl RetryConfig {
    /// Reject attempt counts and multipliers the policy cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts < 1 {
            return Err(Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::Config(format!(
                "retry.multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

/// Cache backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// In-process map, lost on restart
    #[default]
    Memory,
    /// One JSON file per entry under [`CacheConfig::directory`]
    Filesystem,
}

/// Cache configuration for remote call results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching (disabled always computes)
    pub enabled: bool,
    /// Backing store
    pub backend: CacheBackend,
    /// Prefix prepended to every key as `namespace:key`
    pub namespace: String,
    /// TTL used by `CacheManager::remember_default` and `set_default`
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Maximum number of entries kept by the memory backend
    pub max_entries: usize,
    /// Root directory of the filesystem backend
    pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Memory,
            namespace: "podcast".to_string(),
            default_ttl: Duration::from_secs(3600),
            max_entries: 1000,
            directory: None,
        }
    }
}

impl CacheConfig {
    /// Reject a zero-capacity memory backend
    pub fn validate(&self) -> Result<()> {
        if self.backend == CacheBackend::Memory && self.max_entries == 0 {
            return Err(Error::Config(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory for the filesystem backend, falling back to the temp dir
    #[must_use]
    pub fn directory_or_default(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("podcast-failsafe-cache"))
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to a human-readable string ("30s", or "250ms" below a second)
    ///
    /// Precision below one millisecond is truncated: 1500µs is written as "1ms".
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Integer seconds or a duration string
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Secs(u64),
        Text(String),
    }

    /// Deserialize a duration string (e.g., "30s", "5m", "100ms") or an
    /// integer number of seconds
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the value cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Secs(secs) => Ok(Duration::from_secs(secs)),
            RawDuration::Text(s) => parse(s.trim()).map_err(serde::de::Error::custom),
        }
    }

    /// Parse "100ms", "30s", "5m" or a bare number of seconds
    pub(crate) fn parse(s: &str) -> Result<Duration, std::num::ParseIntError> {
        // "ms" first: "100ms" also ends with 's'
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim().parse::<u64>().map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim().parse::<u64>().map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m.saturating_mul(60)))
        } else {
            s.parse::<u64>().map(Duration::from_secs)
        }
    }
}
