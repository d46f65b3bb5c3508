//! Client configuration.
//!
//! Configuration can be built in code with the `with_*` setters or loaded
//! from a TOML file:
//!
//! ```toml
//! base_url = "https://api.tidecast.app/v1"
//! timeout = 15.0
//! retry_count = 2
//! retry_delay = 0.5
//! backoff = "exponential"
//! enable_caching = true
//! disk_cache_bytes = 52428800
//! rate_limit_per_second = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logger::LogLevel;
use crate::retry::{Backoff, RetryPolicy};

/// Errors raised while loading or validating a [`ClientConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path:?}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration text is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How the delay between retries evolves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Constant `retry_delay` between attempts.
    #[default]
    Fixed,
    /// `retry_delay` doubled per attempt, capped at `max_retry_delay`.
    Exponential,
}

/// Configuration for the request executor and its collaborators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL relative endpoints are appended to.
    pub base_url: String,
    /// Per-request transport timeout.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Number of retries after the first attempt.
    pub retry_count: u32,
    /// Delay before each retry (initial delay for exponential backoff).
    #[serde(with = "duration_secs")]
    pub retry_delay: Duration,
    /// Backoff shape.
    pub backoff: BackoffKind,
    /// Upper bound on a single exponential delay.
    #[serde(with = "duration_secs")]
    pub max_retry_delay: Duration,
    /// Emit pipeline events through the request logger.
    pub enable_logging: bool,
    /// Minimum level for the request logger.
    pub log_level: LogLevel,
    /// Read and write the response cache.
    pub enable_caching: bool,
    /// Byte budget of the in-memory cache tier.
    pub memory_cache_bytes: u64,
    /// Byte budget of the on-disk cache tier.
    pub disk_cache_bytes: u64,
    /// Lifetime of cached responses.
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,
    /// Directory owned by the disk tier. `None` selects the platform cache dir.
    pub cache_dir: Option<PathBuf>,
    /// Maximum requests per trailing second for the rate limiter.
    pub rate_limit_per_second: u32,
    /// User agent sent by the default transport.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tidecast.app/v1".to_string(),
            timeout: Duration::from_secs(30),
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            backoff: BackoffKind::Fixed,
            max_retry_delay: Duration::from_secs(30),
            enable_logging: true,
            log_level: LogLevel::Info,
            enable_caching: true,
            memory_cache_bytes: 50 * 1024 * 1024, // 50 MB
            disk_cache_bytes: 100 * 1024 * 1024,  // 100 MB
            cache_ttl: Duration::from_secs(5 * 60),
            cache_dir: None,
            rate_limit_per_second: 10,
            user_agent: format!("Tidecast/{} (Rust)", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Create a configuration with defaults and the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Parse a TOML document. Missing keys take their default value.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = url::Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Invalid(format!("base_url {:?}: {e}", self.base_url)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "base_url must be http(s), got {:?}",
                base.scheme()
            )));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be positive".into()));
        }
        if self.rate_limit_per_second == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit_per_second must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Retry policy described by `retry_count`, `retry_delay` and `backoff`.
    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed(self.retry_delay),
            BackoffKind::Exponential => Backoff::Exponential {
                initial: self.retry_delay,
                multiplier: 2.0,
                max: self.max_retry_delay,
            },
        };
        RetryPolicy::new(self.retry_count, backoff)
    }

    /// Directory for the disk cache tier.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }

    /// Set the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the transport timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries.
    #[must_use]
    pub fn with_retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }

    /// Set the delay between retries.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the backoff shape.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffKind) -> Self {
        self.backoff = backoff;
        self
    }

    /// Enable or disable request logging.
    #[must_use]
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    /// Enable or disable the response cache.
    #[must_use]
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.enable_caching = enabled;
        self
    }

    /// Set the cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Set the memory and disk cache budgets in bytes.
    #[must_use]
    pub fn with_cache_budgets(mut self, memory_bytes: u64, disk_bytes: u64) -> Self {
        self.memory_cache_bytes = memory_bytes;
        self.disk_cache_bytes = disk_bytes;
        self
    }

    /// Set the cache entry lifetime.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the rate limit.
    #[must_use]
    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.rate_limit_per_second = requests_per_second;
        self
    }
}

fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("app", "Tidecast", "tidecast")
        .map(|dirs| dirs.cache_dir().join("responses"))
        .unwrap_or_else(|| std::env::temp_dir().join("tidecast-response-cache"))
}

/// Serde adapter storing a `Duration` as fractional seconds.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
