//! Connection manager with lazy pooling and retry on transient failures.
//!
//! The manager owns the single store handle for the process. The handle is
//! created on first use and dropped after a transient failure, so the next
//! attempt reconnects. Construct one manager at startup and share it by
//! `Arc`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tradecache_core::{RetryConfig, StoreError, TradeCacheResult, Ttl};

use super::codec;
use super::records::Records;
use super::traits::{CacheRecord, KeyValueStore, StoreConnector};

/// Lifecycle of the managed handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No handle has been created yet
    Uninitialized,
    Connected,
    /// The handle was dropped after a transient failure
    Disconnected,
    /// The last operation exhausted its retries, or setup failed
    Failed,
}

/// Pooled store access with bounded, jittered exponential backoff.
pub struct ConnectionManager<C: StoreConnector> {
    connector: C,
    retry: RetryConfig,
    handle: RwLock<Option<Arc<C::Store>>>,
    state: RwLock<ConnectionState>,
    /// Serializes handle creation so concurrent first callers share one pool
    connect_lock: Mutex<()>,
}

impl<C: StoreConnector> ConnectionManager<C> {
    pub fn new(connector: C, retry: RetryConfig) -> Self {
        Self {
            connector,
            retry,
            handle: RwLock::new(None),
            state: RwLock::new(ConnectionState::Uninitialized),
            connect_lock: Mutex::new(()),
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn current_handle(&self) -> Option<Arc<C::Store>> {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop the handle so the next call reconnects.
    pub fn reset(&self) {
        self.handle
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Return the shared handle, creating it on first use.
    ///
    /// Repeated calls return the same `Arc` until a reset.
    pub async fn get_handle(&self) -> Result<Arc<C::Store>, StoreError> {
        if let Some(handle) = self.current_handle() {
            return Ok(handle);
        }

        let _guard = self.connect_lock.lock().await;
        if let Some(handle) = self.current_handle() {
            return Ok(handle);
        }

        match self.connector.connect().await {
            Ok(handle) => {
                *self.handle.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::clone(&handle));
                self.set_state(ConnectionState::Connected);
                tracing::debug!("Store handle created");
                Ok(handle)
            }
            Err(err) => {
                self.set_state(ConnectionState::Failed);
                tracing::error!(error = %err, "Store connection setup failed");
                Err(err)
            }
        }
    }

    /// Delay before the given 1-based retry, with jitter applied.
    ///
    /// Jitter is clamped to [0, 1]; non-finite jitter counts as 0.
    fn backoff_delay(&self, retry: u32) -> Duration {
        let base = self.retry.base_delay(retry);
        let jitter = if self.retry.jitter.is_finite() {
            self.retry.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let spread = if jitter > 0.0 {
            rand::rng().random_range(-jitter..=jitter)
        } else {
            0.0
        };
        Duration::try_from_secs_f64((base.as_secs_f64() * (1.0 + spread)).max(0.0))
            .unwrap_or(base)
    }

    /// Run `op` against the store, retrying transient failures.
    ///
    /// Non-transient failures return immediately. After `max_retries`
    /// retries the last error is wrapped in [`StoreError::RetryExhausted`].
    pub async fn execute_with_retry<R, F, Fut>(
        &self,
        operation: &str,
        op: F,
    ) -> Result<R, StoreError>
    where
        F: Fn(Arc<C::Store>) -> Fut,
        Fut: Future<Output = Result<R, StoreError>>,
    {
        let mut retries: u32 = 0;

        loop {
            let handle = self.get_handle().await?;

            let err = match op(handle).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() {
                tracing::error!(operation, error = %err, "Store rejected operation");
                return Err(err);
            }

            self.reset();

            if retries >= self.retry.max_retries {
                self.set_state(ConnectionState::Failed);
                tracing::error!(
                    operation,
                    attempts = retries + 1,
                    error = %err,
                    "Store operation failed after retries"
                );
                return Err(StoreError::RetryExhausted {
                    operation: operation.to_string(),
                    attempts: retries + 1,
                    last_error: Box::new(err),
                });
            }

            retries += 1;
            let delay = self.backoff_delay(retries);
            tracing::warn!(
                operation,
                attempt = retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient store failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    // ========================================================================
    // PRIMITIVES
    // ========================================================================

    /// Liveness probe with the usual retry policy. Never errors.
    pub async fn ping(&self) -> bool {
        match self
            .execute_with_retry("ping", |store| async move { store.ping().await })
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "Store ping failed");
                false
            }
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.execute_with_retry("get", |store| async move { store.get(key).await })
            .await
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<(), StoreError> {
        self.execute_with_retry("set", |store| async move { store.set(key, value, ttl).await })
            .await
    }

    /// Returns true when the key existed.
    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let keys = [key.to_string()];
        let removed = self
            .execute_with_retry("delete", |store| {
                let keys = &keys;
                async move { store.delete(keys).await }
            })
            .await?;
        Ok(removed > 0)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.execute_with_retry("exists", |store| async move { store.exists(key).await })
            .await
    }

    pub async fn expire(&self, key: &str, seconds: u64) -> Result<bool, StoreError> {
        self.execute_with_retry("expire", |store| async move {
            store.expire(key, seconds).await
        })
        .await
    }

    /// Remaining seconds; `-1` for no expiry, `-2` for a missing key.
    pub async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        self.execute_with_retry("ttl", |store| async move { store.ttl(key).await })
            .await
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        self.execute_with_retry("hset", |store| async move {
            store.hset(key, field, value).await
        })
        .await
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.execute_with_retry("hget", |store| async move { store.hget(key, field).await })
            .await
    }

    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.execute_with_retry("hgetall", |store| async move { store.hgetall(key).await })
            .await
    }

    pub async fn hdel(&self, key: &str, field: &str) -> Result<u64, StoreError> {
        self.execute_with_retry("hdel", |store| async move { store.hdel(key, field).await })
            .await
    }

    pub async fn lpush(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.execute_with_retry("lpush", |store| async move { store.lpush(key, value).await })
            .await
    }

    pub async fn rpush(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.execute_with_retry("rpush", |store| async move { store.rpush(key, value).await })
            .await
    }

    pub async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        self.execute_with_retry("lrange", |store| async move {
            store.lrange(key, start, stop).await
        })
        .await
    }

    pub async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), StoreError> {
        self.execute_with_retry("ltrim", |store| async move {
            store.ltrim(key, start, stop).await
        })
        .await
    }

    pub async fn llen(&self, key: &str) -> Result<u64, StoreError> {
        self.execute_with_retry("llen", |store| async move { store.llen(key).await })
            .await
    }

    /// Prepend `value` and keep only the newest `max_items` entries.
    ///
    /// The push and trim run as one atomic pipeline. Returns the list length
    /// after trimming.
    pub async fn add_to_list_limited(
        &self,
        key: &str,
        value: &str,
        max_items: u64,
    ) -> Result<u64, StoreError> {
        if max_items == 0 {
            return Err(StoreError::operation(
                "add_to_list_limited",
                "max_items must be at least 1",
            ));
        }

        self.execute_with_retry("add_to_list_limited", |store| async move {
            store.push_capped(key, value, max_items).await
        })
        .await
    }

    /// Delete every key matching `pattern`, returning how many were removed.
    pub async fn clear_cache(&self, pattern: &str) -> Result<u64, StoreError> {
        let keys = self
            .execute_with_retry("keys", |store| async move { store.keys(pattern).await })
            .await?;

        if keys.is_empty() {
            return Ok(0);
        }

        let removed = self
            .execute_with_retry("delete", |store| {
                let keys = &keys;
                async move { store.delete(keys).await }
            })
            .await?;

        tracing::info!(pattern, removed, "Cleared cache keys");
        Ok(removed)
    }

    // ========================================================================
    // TYPED RECORDS
    // ========================================================================

    /// Encode and write records under `key`.
    pub async fn set_record<T: CacheRecord>(
        &self,
        key: &str,
        records: &Records<T>,
        ttl: Ttl,
    ) -> TradeCacheResult<()> {
        let text = codec::encode(records)?;
        self.set(key, &text, ttl).await?;
        Ok(())
    }

    /// Read and decode records under `key`.
    pub async fn get_record<T: CacheRecord>(&self, key: &str) -> TradeCacheResult<Option<Records<T>>> {
        match self.get(key).await? {
            Some(text) => Ok(Some(codec::decode(&text)?)),
            None => Ok(None),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
