//! Cache layer over a key-value store.
//!
//! Reads go through [`CacheFirst`]: derive the key, try the store, fall back
//! to the source on a miss and write the fetched value back with the
//! resource's expiry. Store trouble on the read path is logged and treated
//! as a miss, so a degraded cache never fails a read that the source can
//! still serve.
//!
//! # Example
//!
//! ```ignore
//! let manager = Arc::new(ConnectionManager::from_store_config(StoreConfig::from_env()));
//! let cache = CacheFirst::new(manager, KeySchema::default());
//!
//! let params = KeyParams::new().with("symbol", "AAPL");
//! let quote = cache
//!     .cache_first_one::<Quote, _, _, _>(ResourceType::StockQuote, &params, || async {
//!         broker.latest_quote("AAPL").await
//!     })
//!     .await?;
//! ```

pub mod cache_first;
pub mod codec;
pub mod connection;
pub mod key_schema;
pub mod mock;
pub mod records;
pub mod redis_backend;
pub mod traits;

pub use cache_first::{CacheFirst, CacheFirstError, CacheStats};
pub use connection::{ConnectionManager, ConnectionState};
pub use key_schema::{KeyParams, KeySchema};
pub use mock::{MockConnector, MockStore};
pub use records::Records;
pub use redis_backend::{RedisConnector, RedisStore};
pub use traits::{CacheRecord, KeyValueStore, StoreConnector};
