//! Store and record traits.
//!
//! [`KeyValueStore`] is the command surface the connection manager drives.
//! [`StoreConnector`] builds pooled store handles. [`CacheRecord`] marks the
//! record types the codec may encode.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tradecache_core::{AccountSummary, Bar, Position, Quote, StoreError, Ttl};

/// Marker trait for records that can be cached.
///
/// # Implementation Requirements
///
/// - `RECORD_TYPE` must be stable; it names the record in decode errors and logs
/// - The record must serialize to a JSON object
pub trait CacheRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable name for this record type.
    const RECORD_TYPE: &'static str;
}

/// Key-value command surface backed by a pooled store.
///
/// Implementations classify every failure as either
/// [`StoreError::Transient`] (the manager retries) or
/// [`StoreError::Operation`] (returned to the caller as-is).
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Round-trip a `PING`.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value. [`Ttl::Persistent`] writes without an expiry.
    async fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<(), StoreError>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Set an expiry. Returns false when the key does not exist.
    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, StoreError>;

    /// Remaining seconds; `-1` for no expiry, `-2` for a missing key.
    async fn ttl(&self, key: &str) -> Result<i64, StoreError>;

    /// Returns true when the field was newly created.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn hdel(&self, key: &str, field: &str) -> Result<u64, StoreError>;

    /// Prepend, returning the new list length.
    async fn lpush(&self, key: &str, value: &str) -> Result<u64, StoreError>;

    /// Append, returning the new list length.
    async fn rpush(&self, key: &str, value: &str) -> Result<u64, StoreError>;

    /// Inclusive range with negative indices counting from the tail.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError>;

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), StoreError>;

    async fn llen(&self, key: &str) -> Result<u64, StoreError>;

    /// Atomically prepend and trim to the newest `max_items` entries.
    ///
    /// Returns the list length after trimming.
    async fn push_capped(&self, key: &str, value: &str, max_items: u64) -> Result<u64, StoreError>;

    /// Keys matching a glob pattern.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}

/// Builds store handles for the connection manager.
#[async_trait]
pub trait StoreConnector: Send + Sync + 'static {
    type Store: KeyValueStore;

    /// Build a pooled handle. Setup failures are
    /// [`StoreError::ConnectionSetup`] and are never retried.
    async fn connect(&self) -> Result<Arc<Self::Store>, StoreError>;
}

// ============================================================================
// IMPLEMENTATIONS FOR TRADECACHE RECORDS
// ============================================================================

impl CacheRecord for AccountSummary {
    const RECORD_TYPE: &'static str = "account_summary";
}

impl CacheRecord for Position {
    const RECORD_TYPE: &'static str = "position";
}

impl CacheRecord for Bar {
    const RECORD_TYPE: &'static str = "bar";
}

impl CacheRecord for Quote {
    const RECORD_TYPE: &'static str = "quote";
}
