//! tradecache Storage - Cache-First Data Access
//!
//! Serves typed reads from a Redis cache and falls back to a caller-supplied
//! source on a miss. The store is reached through a pooled, retrying
//! [`ConnectionManager`]; keys and expiries come from [`KeySchema`]; values
//! are encoded by the record [`codec`].

pub mod cache;

pub use cache::{
    codec, CacheFirst, CacheFirstError, CacheRecord, CacheStats, ConnectionManager,
    ConnectionState, KeyParams, KeySchema, KeyValueStore, MockConnector, MockStore, Records,
    RedisConnector, RedisStore, StoreConnector,
};
