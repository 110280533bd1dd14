//! Cache-first orchestration.
//!
//! Every read derives its key from the [`KeySchema`], tries the store and
//! falls back to the caller's fetch on a miss. Fetched values are written
//! back with the resource's TTL. Store and decode failures on this path are
//! logged and counted, then handled as a miss; only key derivation errors
//! and source errors reach the caller.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tradecache_core::{CodecError, ResourceType, SchemaError, TradeCacheResult};

use super::codec;
use super::connection::ConnectionManager;
use super::key_schema::{KeyParams, KeySchema};
use super::records::Records;
use super::traits::{CacheRecord, StoreConnector};

/// Failure of a cache-first read.
///
/// Cache subsystem failures never appear here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheFirstError<E> {
    #[error("Cache key error: {0}")]
    Schema(#[from] SchemaError),

    /// The fetch collaborator failed; its error is passed through unchanged.
    #[error("Source fetch failed: {0}")]
    Source(E),
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from the store.
    pub hits: u64,
    /// Reads that fell through to the source, including read errors.
    pub misses: u64,
    /// Store or decode failures on the read path.
    pub read_errors: u64,
    /// Successful write-backs.
    pub writes: u64,
    /// Write-backs that failed and were swallowed.
    pub write_failures: u64,
    /// Calls into the fetch collaborator.
    pub fetches: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    read_errors: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
    fetches: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
        }
    }
}

/// Cache-first reader over a shared [`ConnectionManager`].
pub struct CacheFirst<C: StoreConnector> {
    manager: Arc<ConnectionManager<C>>,
    schema: KeySchema,
    stats: Arc<StatsCounters>,
}

impl<C: StoreConnector> Clone for CacheFirst<C> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            schema: self.schema.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<C: StoreConnector> CacheFirst<C> {
    pub fn new(manager: Arc<ConnectionManager<C>>, schema: KeySchema) -> Self {
        Self {
            manager,
            schema,
            stats: Arc::new(StatsCounters::default()),
        }
    }

    pub fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    pub fn schema(&self) -> &KeySchema {
        &self.schema
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Read `key` and narrow the payload. Any failure counts as a miss.
    async fn lookup<T, R, N>(&self, key: &str, narrow: N) -> Option<R>
    where
        T: CacheRecord,
        N: FnOnce(Records<T>) -> Result<R, CodecError>,
    {
        let text = match self.manager.get(key).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::debug!(key, "Cache miss");
                StatsCounters::bump(&self.stats.misses);
                return None;
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed, treating as miss");
                StatsCounters::bump(&self.stats.read_errors);
                StatsCounters::bump(&self.stats.misses);
                return None;
            }
        };

        match codec::decode::<T>(&text).and_then(narrow) {
            Ok(value) => {
                tracing::debug!(key, "Cache hit");
                StatsCounters::bump(&self.stats.hits);
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Cached payload unusable, treating as miss");
                StatsCounters::bump(&self.stats.read_errors);
                StatsCounters::bump(&self.stats.misses);
                None
            }
        }
    }

    /// Call the source and count it.
    async fn fetch_source<V, F, Fut, E>(&self, fetch: F) -> Result<V, CacheFirstError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        StatsCounters::bump(&self.stats.fetches);
        fetch().await.map_err(CacheFirstError::Source)
    }

    /// Store an encoded payload with the resource TTL. Failures are swallowed.
    async fn write_back(
        &self,
        resource_type: ResourceType,
        key: &str,
        encoded: Result<String, CodecError>,
    ) {
        let ttl = self.schema.get_ttl(resource_type);
        let result = match encoded {
            Ok(text) => self.manager.set(key, &text, ttl).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(()) => {
                tracing::debug!(key, ttl_secs = ttl.as_seconds(), "Cached fetched value");
                StatsCounters::bump(&self.stats.writes);
            }
            Err(error) => {
                tracing::warn!(key, %error, "Cache write failed, returning fetched value");
                StatsCounters::bump(&self.stats.write_failures);
            }
        }
    }

    /// Serve from cache, or fetch and cache on a miss.
    ///
    /// `fetch` is not called on a hit. A `None` from `fetch` is returned as-is
    /// and nothing is cached.
    pub async fn cache_first<T, F, Fut, E>(
        &self,
        resource_type: ResourceType,
        params: &KeyParams,
        fetch: F,
    ) -> Result<Option<Records<T>>, CacheFirstError<E>>
    where
        T: CacheRecord,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Records<T>>, E>>,
    {
        let key = self.schema.get_key(resource_type, params)?;
        if let Some(hit) = self.lookup::<T, _, _>(&key, Ok).await {
            return Ok(Some(hit));
        }

        let fetched = self.fetch_source(fetch).await?;
        if let Some(records) = &fetched {
            self.write_back(resource_type, &key, codec::encode(records))
                .await;
        }
        Ok(fetched)
    }

    /// Single-record form of [`cache_first`](Self::cache_first).
    ///
    /// A cached list under the key counts as a miss.
    pub async fn cache_first_one<T, F, Fut, E>(
        &self,
        resource_type: ResourceType,
        params: &KeyParams,
        fetch: F,
    ) -> Result<Option<T>, CacheFirstError<E>>
    where
        T: CacheRecord,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let key = self.schema.get_key(resource_type, params)?;
        if let Some(hit) = self.lookup::<T, _, _>(&key, Records::into_one).await {
            return Ok(Some(hit));
        }

        let fetched = self.fetch_source(fetch).await?;
        if let Some(record) = &fetched {
            self.write_back(resource_type, &key, codec::encode_one(record))
                .await;
        }
        Ok(fetched)
    }

    /// List form of [`cache_first`](Self::cache_first).
    ///
    /// A cached single record widens to a one-element list.
    pub async fn cache_first_list<T, F, Fut, E>(
        &self,
        resource_type: ResourceType,
        params: &KeyParams,
        fetch: F,
    ) -> Result<Option<Vec<T>>, CacheFirstError<E>>
    where
        T: CacheRecord,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Vec<T>>, E>>,
    {
        let key = self.schema.get_key(resource_type, params)?;
        if let Some(hit) = self.lookup(&key, |records: Records<T>| Ok(records.into_many())).await {
            return Ok(Some(hit));
        }

        let fetched = self.fetch_source(fetch).await?;
        if let Some(items) = &fetched {
            self.write_back(resource_type, &key, codec::encode_many(items))
                .await;
        }
        Ok(fetched)
    }

    /// Batch read over several parameter sets of one resource.
    ///
    /// Each key is looked up on its own. `fetch_missing` is called once with
    /// the parameter sets that missed and must answer in the same order; a
    /// short answer leaves the tail as `None`. It is not called when every
    /// key hits. Results line up with `params_list`.
    pub async fn cache_first_many<T, F, Fut, E>(
        &self,
        resource_type: ResourceType,
        params_list: &[KeyParams],
        fetch_missing: F,
    ) -> Result<Vec<Option<T>>, CacheFirstError<E>>
    where
        T: CacheRecord,
        F: FnOnce(Vec<KeyParams>) -> Fut,
        Fut: Future<Output = Result<Vec<Option<T>>, E>>,
    {
        let keys = params_list
            .iter()
            .map(|params| self.schema.get_key(resource_type, params))
            .collect::<Result<Vec<_>, _>>()?;

        let mut results: Vec<Option<T>> = Vec::with_capacity(keys.len());
        let mut missing: Vec<usize> = Vec::new();
        for (index, key) in keys.iter().enumerate() {
            let hit = self.lookup::<T, _, _>(key, Records::into_one).await;
            if hit.is_none() {
                missing.push(index);
            }
            results.push(hit);
        }

        if missing.is_empty() {
            return Ok(results);
        }

        let missing_params = missing
            .iter()
            .map(|&index| params_list[index].clone())
            .collect();
        let fetched = self
            .fetch_source(move || fetch_missing(missing_params))
            .await?;

        for (index, record) in missing.into_iter().zip(fetched) {
            if let Some(record) = &record {
                self.write_back(resource_type, &keys[index], codec::encode_one(record))
                    .await;
            }
            results[index] = record;
        }

        Ok(results)
    }

    // ========================================================================
    // ADMINISTRATION
    // ========================================================================

    /// Drop the cached entry for one request. Returns true if it existed.
    pub async fn invalidate(
        &self,
        resource_type: ResourceType,
        params: &KeyParams,
    ) -> TradeCacheResult<bool> {
        let key = self.schema.get_key(resource_type, params)?;
        let removed = self.manager.delete(&key).await?;
        tracing::info!(key = %key, removed, "Invalidated cache entry");
        Ok(removed)
    }

    /// Drop every cached entry of one resource type.
    pub async fn clear_resource(&self, resource_type: ResourceType) -> TradeCacheResult<u64> {
        let pattern = self.schema.pattern_for(resource_type);
        Ok(self.manager.clear_cache(&pattern).await?)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::mock::{MockConnector, MockStore};
    use std::sync::atomic::AtomicUsize;
    use tradecache_core::{Bar, Quote, RetryConfig, StoreError, Ttl};
    use tradecache_test_utils::fixtures;

    fn cache_over(store: Arc<MockStore>) -> CacheFirst<MockConnector> {
        let manager = ConnectionManager::new(MockConnector::new(store), RetryConfig::default());
        CacheFirst::new(Arc::new(manager), KeySchema::default())
    }

    fn quote_params(symbol: &str) -> KeyParams {
        KeyParams::new().with("symbol", symbol)
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);
        assert!((CacheStats::default().hit_rate() - 0.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_miss_fetches_once_and_caches() {
        let store = Arc::new(MockStore::new());
        let cache = cache_over(Arc::clone(&store));
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let quote = fixtures::aapl_quote();
        for _ in 0..2 {
            let got = cache
                .cache_first_one(ResourceType::StockQuote, &quote_params("AAPL"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(Some(fixtures::aapl_quote()))
                })
                .await
                .unwrap();
            assert_eq!(got, Some(quote.clone()));
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.writes(),
            vec![("cache:stock_quote:symbol=AAPL".to_string(), Ttl::Seconds(60))]
        );
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.fetches, stats.writes), (1, 1, 1, 1));
    }

    #[tokio::test]
    async fn test_none_from_source_is_not_cached() {
        let store = Arc::new(MockStore::new());
        let cache = cache_over(Arc::clone(&store));

        let got = cache
            .cache_first::<Quote, _, _, String>(ResourceType::StockQuote, &quote_params("ZZZZ"), || async {
                Ok(None)
            })
            .await
            .unwrap();
        assert_eq!(got, None);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_source_error_passes_through() {
        let cache = cache_over(Arc::new(MockStore::new()));
        let err = cache
            .cache_first_one::<Quote, _, _, _>(ResourceType::StockQuote, &quote_params("AAPL"), || async {
                Err("rate limited".to_string())
            })
            .await
            .unwrap_err();
        assert_eq!(err, CacheFirstError::Source("rate limited".to_string()));
    }

    #[tokio::test]
    async fn test_schema_error_skips_store_and_source() {
        let store = Arc::new(MockStore::new());
        let cache = cache_over(Arc::clone(&store));
        let err = cache
            .cache_first_list::<Bar, _, _, String>(ResourceType::StockBars, &quote_params("AAPL"), || async {
                Err("fetch must not run".to_string())
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CacheFirstError::Schema(SchemaError::MissingParameter { ref field, .. }) if field == "timeframe"
        ));
        assert_eq!(store.call_count("get"), 0);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let store = Arc::new(MockStore::new());
        store.seed("cache:stock_quote:symbol=AAPL", "{not json", Ttl::Seconds(60));
        let cache = cache_over(Arc::clone(&store));

        let got = cache
            .cache_first_one(ResourceType::StockQuote, &quote_params("AAPL"), || async {
                Ok::<_, String>(Some(fixtures::aapl_quote()))
            })
            .await
            .unwrap();
        assert_eq!(got, Some(fixtures::aapl_quote()));
        assert_eq!(cache.stats().read_errors, 1);
        assert!(store.peek("cache:stock_quote:symbol=AAPL").unwrap().starts_with('{'));
    }

    #[tokio::test]
    async fn test_list_entry_is_a_miss_for_single_read() {
        let store = Arc::new(MockStore::new());
        let cache = cache_over(Arc::clone(&store));
        let listed = codec::encode_many(&[fixtures::aapl_quote()]).unwrap();
        store.seed("cache:stock_quote:symbol=AAPL", &listed, Ttl::Seconds(60));

        let got = cache
            .cache_first_one(ResourceType::StockQuote, &quote_params("AAPL"), || async {
                Ok::<_, String>(Some(fixtures::aapl_quote()))
            })
            .await
            .unwrap();
        assert!(got.is_some());
        assert_eq!(cache.stats().fetches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_down_still_serves_source() {
        let store = Arc::new(MockStore::new());
        store.fail_next(100, StoreError::transient("get", "connection refused"));
        let cache = cache_over(Arc::clone(&store));

        let got = cache
            .cache_first_one(ResourceType::StockQuote, &quote_params("AAPL"), || async {
                Ok::<_, String>(Some(fixtures::aapl_quote()))
            })
            .await
            .unwrap();
        assert_eq!(got, Some(fixtures::aapl_quote()));

        let stats = cache.stats();
        assert_eq!(stats.read_errors, 1);
        assert_eq!(stats.write_failures, 1);
        assert_eq!(stats.writes, 0);
    }

    #[tokio::test]
    async fn test_many_fetches_only_misses() {
        let store = Arc::new(MockStore::new());
        let cache = cache_over(Arc::clone(&store));
        let mut cached = fixtures::aapl_quote();
        cached.symbol = "MSFT".to_string();
        store.seed(
            "cache:stock_quote:symbol=MSFT",
            &codec::encode_one(&cached).unwrap(),
            Ttl::Seconds(60),
        );

        let params = vec![quote_params("AAPL"), quote_params("MSFT"), quote_params("ZZZZ")];
        let results = cache
            .cache_first_many(ResourceType::StockQuote, &params, |missing| async move {
                let symbols: Vec<_> = missing
                    .iter()
                    .map(|p| p.get("symbol").unwrap_or_default().to_string())
                    .collect();
                assert_eq!(symbols, vec!["AAPL", "ZZZZ"]);
                Ok::<_, String>(vec![Some(fixtures::aapl_quote()), None])
            })
            .await
            .unwrap();

        assert_eq!(results[0], Some(fixtures::aapl_quote()));
        assert_eq!(results[1], Some(cached));
        assert_eq!(results[2], None);
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_many_all_hits_skips_source() {
        let store = Arc::new(MockStore::new());
        let cache = cache_over(Arc::clone(&store));
        store.seed(
            "cache:stock_quote:symbol=AAPL",
            &codec::encode_one(&fixtures::aapl_quote()).unwrap(),
            Ttl::Seconds(60),
        );

        let results = cache
            .cache_first_many::<Quote, _, _, String>(
                ResourceType::StockQuote,
                &[quote_params("AAPL")],
                |_| async { Err("fetch must not run".to_string()) },
            )
            .await
            .unwrap();
        assert_eq!(results, vec![Some(fixtures::aapl_quote())]);
        assert_eq!(cache.stats().fetches, 0);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear_resource() {
        let store = Arc::new(MockStore::new());
        let cache = cache_over(Arc::clone(&store));
        for symbol in ["AAPL", "MSFT"] {
            store.seed(&format!("cache:stock_quote:symbol={}", symbol), "{}", Ttl::Seconds(60));
        }
        store.seed("cache:positions:user_id=u1", "[]", Ttl::Seconds(300));

        assert!(cache
            .invalidate(ResourceType::StockQuote, &quote_params("AAPL"))
            .await
            .unwrap());
        assert_eq!(cache.clear_resource(ResourceType::StockQuote).await, Ok(1));
        assert!(store.peek("cache:positions:user_id=u1").is_some());
    }
}
