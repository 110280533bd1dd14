//! Store, retry and namespace configuration.
//!
//! Every config type follows the same shape: `Default` carries the
//! production defaults, `from_env()` overlays `TRADECACHE_*` variables and
//! `validate()` rejects values the store client cannot use.

use crate::{ConfigError, TradeCacheResult};
use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// RETRY
// ============================================================================

/// Backoff policy for transient store failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Base delay, doubled on every retry
    pub backoff_factor: Duration,
    /// Upper bound on a single delay before jitter
    pub max_backoff: Duration,
    /// Fractional jitter applied to each delay, in [0, 1]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `TRADECACHE_REDIS_MAX_RETRIES` (default: 3)
    /// - `TRADECACHE_REDIS_BACKOFF_MS` (default: 500)
    /// - `TRADECACHE_REDIS_MAX_BACKOFF_MS` (default: 30000)
    /// - `TRADECACHE_REDIS_RETRY_JITTER` (default: 0.1)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_retries: env_parse("TRADECACHE_REDIS_MAX_RETRIES").unwrap_or(defaults.max_retries),
            backoff_factor: env_parse("TRADECACHE_REDIS_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_factor),
            max_backoff: env_parse("TRADECACHE_REDIS_MAX_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_backoff),
            jitter: env_parse("TRADECACHE_REDIS_RETRY_JITTER").unwrap_or(defaults.jitter),
        }
    }

    pub fn validate(&self) -> TradeCacheResult<()> {
        if self.backoff_factor.is_zero() {
            return Err(invalid(
                "backoff_factor",
                format!("{:?}", self.backoff_factor),
                "backoff_factor must be greater than 0",
            )
            .into());
        }

        if self.max_backoff < self.backoff_factor {
            return Err(invalid(
                "max_backoff",
                format!("{:?}", self.max_backoff),
                "max_backoff must be at least backoff_factor",
            )
            .into());
        }

        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(invalid(
                "jitter",
                self.jitter,
                "jitter must be between 0.0 and 1.0",
            )
            .into());
        }

        Ok(())
    }

    /// Delay before the given 1-based retry, before jitter is applied.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = retry.min(63) as i32;
        let secs = self.backoff_factor.as_secs_f64() * 2f64.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Connection settings for the Redis cache store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
    /// Maximum pooled connections
    pub max_connections: usize,
    /// Per-command deadline
    pub socket_timeout: Duration,
    /// Deadline for establishing a pooled connection
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
            max_connections: 10,
            socket_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `TRADECACHE_REDIS_HOST` (default: localhost)
    /// - `TRADECACHE_REDIS_PORT` (default: 6379)
    /// - `TRADECACHE_REDIS_PASSWORD` (default: none)
    /// - `TRADECACHE_REDIS_DB` (default: 0)
    /// - `TRADECACHE_REDIS_POOL_SIZE` (default: 10)
    /// - `TRADECACHE_REDIS_SOCKET_TIMEOUT` in seconds (default: 5)
    /// - `TRADECACHE_REDIS_CONNECT_TIMEOUT` in seconds (default: 5)
    ///
    /// Retry settings come from [`RetryConfig::from_env`].
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("TRADECACHE_REDIS_HOST").unwrap_or(defaults.host),
            port: env_parse("TRADECACHE_REDIS_PORT").unwrap_or(defaults.port),
            password: std::env::var("TRADECACHE_REDIS_PASSWORD")
                .ok()
                .filter(|p| !p.is_empty()),
            db: env_parse("TRADECACHE_REDIS_DB").unwrap_or(defaults.db),
            max_connections: env_parse("TRADECACHE_REDIS_POOL_SIZE")
                .unwrap_or(defaults.max_connections),
            socket_timeout: env_parse("TRADECACHE_REDIS_SOCKET_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.socket_timeout),
            connect_timeout: env_parse("TRADECACHE_REDIS_CONNECT_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            retry: RetryConfig::from_env(),
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - host is non-empty and port is non-zero
    /// - pool size is non-zero
    /// - both timeouts are positive
    /// - the retry policy
    pub fn validate(&self) -> TradeCacheResult<()> {
        if self.host.trim().is_empty() {
            return Err(invalid("host", &self.host, "host must not be empty").into());
        }

        if self.port == 0 {
            return Err(invalid("port", self.port, "port must be greater than 0").into());
        }

        if self.max_connections == 0 {
            return Err(invalid(
                "max_connections",
                self.max_connections,
                "max_connections must be greater than 0",
            )
            .into());
        }

        if self.socket_timeout.is_zero() {
            return Err(invalid(
                "socket_timeout",
                format!("{:?}", self.socket_timeout),
                "socket_timeout must be positive",
            )
            .into());
        }

        if self.connect_timeout.is_zero() {
            return Err(invalid(
                "connect_timeout",
                format!("{:?}", self.connect_timeout),
                "connect_timeout must be positive",
            )
            .into());
        }

        self.retry.validate()
    }

    /// Connection URL in `redis://[:password@]host:port/db` form.
    pub fn redis_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                urlencoding::encode(password),
                self.host,
                self.port,
                self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

// ============================================================================
// CACHE
// ============================================================================

/// Key namespace settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// First segment of every cache key
    pub namespace: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            namespace: "cache".to_string(),
        }
    }
}

impl CacheSettings {
    /// Reads `TRADECACHE_NAMESPACE`, falling back to `cache`.
    pub fn from_env() -> Self {
        Self {
            namespace: std::env::var("TRADECACHE_NAMESPACE")
                .ok()
                .filter(|ns| !ns.is_empty())
                .unwrap_or_else(|| Self::default().namespace),
        }
    }

    pub fn validate(&self) -> TradeCacheResult<()> {
        if self.namespace.is_empty() || self.namespace.contains([':', '*', ' ']) {
            return Err(invalid(
                "namespace",
                &self.namespace,
                "namespace must be non-empty and free of ':', '*' and spaces",
            )
            .into());
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
