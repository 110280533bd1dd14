//! tradecache Core - Records, Resources and Errors
//!
//! Pure data structures shared by the caching layer. Store access, key
//! derivation and the cache-first policy live in `tradecache-storage`.

use chrono::{DateTime, Utc};

pub mod config;
pub mod error;
pub mod records;
pub mod resource;
pub mod telemetry;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use config::{CacheSettings, RetryConfig, StoreConfig};
pub use error::{
    CodecError, ConfigError, SchemaError, StoreError, TradeCacheError, TradeCacheResult,
    ValidationError,
};
pub use records::{AccountSummary, Bar, Position, PositionSide, Quote};
pub use resource::{ResourceType, Ttl};
pub use telemetry::{init_tracing, TelemetryConfig};
