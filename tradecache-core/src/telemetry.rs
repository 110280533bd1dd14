//! Tracing subscriber bootstrap.

use crate::{ConfigError, TradeCacheResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_filter: std::env::var("TRADECACHE_LOG_FILTER")
                .unwrap_or_else(|_| "tradecache_storage=info,warn".to_string()),
            json: std::env::var("TRADECACHE_LOG_JSON")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(true),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Call once at process start. Fails with `ConfigError::InvalidValue` when a
/// subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> TradeCacheResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| ConfigError::InvalidValue {
        field: "tracing".to_string(),
        value: config.default_filter.clone(),
        reason: format!("Failed to init subscriber: {}", e),
    })?;

    tracing::info!(
        filter = %config.default_filter,
        json = config.json,
        "Telemetry initialized"
    );

    Ok(())
}
