//! Redis-backed [`KeyValueStore`] over a deadpool connection pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, PoolConfig, PoolError, Runtime, Timeouts};
use redis::{Cmd, FromRedisValue, Pipeline, RedisError};
use tradecache_core::{StoreConfig, StoreError, Ttl};

use super::connection::ConnectionManager;
use super::traits::{KeyValueStore, StoreConnector};

/// Classify a client error. Network-level failures are transient.
fn classify_redis_error(operation: &str, err: &RedisError) -> StoreError {
    if err.is_timeout() || err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        StoreError::transient(operation, err.to_string())
    } else {
        StoreError::operation(operation, err.to_string())
    }
}

/// Classify a pool checkout error.
fn classify_pool_error(operation: &str, err: PoolError) -> StoreError {
    match err {
        PoolError::Timeout(kind) => {
            StoreError::transient(operation, format!("pool timeout: {:?}", kind))
        }
        PoolError::Closed => StoreError::transient(operation, "pool closed"),
        PoolError::Backend(e) => classify_redis_error(operation, &e),
        other => StoreError::operation(operation, other.to_string()),
    }
}

/// Pooled Redis connection handle.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    socket_timeout: Duration,
}

impl RedisStore {
    pub fn new(pool: Pool, socket_timeout: Duration) -> Self {
        Self {
            pool,
            socket_timeout,
        }
    }

    /// Build a pool from configuration. Does not open a connection.
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut cfg = Config::from_url(config.redis_url());
        let mut pool_cfg = PoolConfig::new(config.max_connections);
        pool_cfg.timeouts = Timeouts {
            wait: Some(config.connect_timeout),
            create: Some(config.connect_timeout),
            recycle: Some(config.socket_timeout),
        };
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::ConnectionSetup {
                reason: format!("Failed to create pool: {}", e),
            })?;

        Ok(Self::new(pool, config.socket_timeout))
    }

    /// Current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn query<T: FromRedisValue>(&self, operation: &str, cmd: &Cmd) -> Result<T, StoreError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| classify_pool_error(operation, e))?;

        match tokio::time::timeout(self.socket_timeout, cmd.query_async(&mut conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify_redis_error(operation, &e)),
            Err(_) => Err(StoreError::transient(
                operation,
                format!("timed out after {:?}", self.socket_timeout),
            )),
        }
    }

    async fn query_pipeline<T: FromRedisValue>(
        &self,
        operation: &str,
        pipe: &Pipeline,
    ) -> Result<T, StoreError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| classify_pool_error(operation, e))?;

        match tokio::time::timeout(self.socket_timeout, pipe.query_async(&mut conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify_redis_error(operation, &e)),
            Err(_) => Err(StoreError::transient(
                operation,
                format!("timed out after {:?}", self.socket_timeout),
            )),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let _: String = self.query("ping", &redis::cmd("PING")).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.query("get", redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Ttl::Seconds(secs) = ttl {
            cmd.arg("EX").arg(secs);
        }
        let _: () = self.query("set", &cmd).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.query("delete", redis::cmd("DEL").arg(keys)).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let count: u64 = self.query("exists", redis::cmd("EXISTS").arg(key)).await?;
        Ok(count > 0)
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, StoreError> {
        let applied: i64 = self
            .query("expire", redis::cmd("EXPIRE").arg(key).arg(seconds))
            .await?;
        Ok(applied == 1)
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        self.query("ttl", redis::cmd("TTL").arg(key)).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let added: u64 = self
            .query("hset", redis::cmd("HSET").arg(key).arg(field).arg(value))
            .await?;
        Ok(added > 0)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.query("hget", redis::cmd("HGET").arg(key).arg(field))
            .await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.query("hgetall", redis::cmd("HGETALL").arg(key)).await
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<u64, StoreError> {
        self.query("hdel", redis::cmd("HDEL").arg(key).arg(field))
            .await
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.query("lpush", redis::cmd("LPUSH").arg(key).arg(value))
            .await
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.query("rpush", redis::cmd("RPUSH").arg(key).arg(value))
            .await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        self.query("lrange", redis::cmd("LRANGE").arg(key).arg(start).arg(stop))
            .await
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), StoreError> {
        let _: () = self
            .query("ltrim", redis::cmd("LTRIM").arg(key).arg(start).arg(stop))
            .await?;
        Ok(())
    }

    async fn llen(&self, key: &str) -> Result<u64, StoreError> {
        self.query("llen", redis::cmd("LLEN").arg(key)).await
    }

    async fn push_capped(&self, key: &str, value: &str, max_items: u64) -> Result<u64, StoreError> {
        let stop = i64::try_from(max_items).unwrap_or(i64::MAX) - 1;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("LPUSH")
            .arg(key)
            .arg(value)
            .ignore()
            .cmd("LTRIM")
            .arg(key)
            .arg(0)
            .arg(stop)
            .ignore()
            .cmd("LLEN")
            .arg(key);

        let (len,): (u64,) = self.query_pipeline("add_to_list_limited", &pipe).await?;
        Ok(len)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.query("keys", redis::cmd("KEYS").arg(pattern)).await
    }
}

/// Builds a [`RedisStore`] from [`StoreConfig`].
#[derive(Debug, Clone)]
pub struct RedisConnector {
    config: StoreConfig,
}

impl RedisConnector {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

#[async_trait]
impl StoreConnector for RedisConnector {
    type Store = RedisStore;

    async fn connect(&self) -> Result<Arc<RedisStore>, StoreError> {
        self.config
            .validate()
            .map_err(|e| StoreError::ConnectionSetup {
                reason: e.to_string(),
            })?;

        let store = RedisStore::from_config(&self.config)?;
        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            db = self.config.db,
            max_connections = self.config.max_connections,
            "Redis pool created"
        );
        Ok(Arc::new(store))
    }
}

impl ConnectionManager<RedisConnector> {
    /// Manager over Redis whose retry policy is the config's own `retry`.
    pub fn from_store_config(config: StoreConfig) -> Self {
        let retry = config.retry.clone();
        Self::new(RedisConnector::new(config), retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::ErrorKind;
    use tradecache_core::RetryConfig;

    #[test]
    fn test_io_errors_are_transient() {
        let err = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(classify_redis_error("get", &err).is_transient());
    }

    #[test]
    fn test_server_errors_are_not_transient() {
        let err = RedisError::from((ErrorKind::TypeError, "WRONGTYPE"));
        assert!(!classify_redis_error("get", &err).is_transient());
    }

    #[test]
    fn test_pool_errors_classified() {
        assert!(classify_pool_error("get", PoolError::Closed).is_transient());

        let refused = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(classify_pool_error("get", PoolError::Backend(refused)).is_transient());
        assert!(!classify_pool_error("get", PoolError::NoRuntimeSpecified).is_transient());
    }

    #[tokio::test]
    async fn test_pool_builds_without_connecting() {
        let store = RedisStore::from_config(&StoreConfig::default()).unwrap();
        assert_eq!(store.pool_size(), 0);
    }

    #[test]
    fn test_manager_uses_store_retry_policy() {
        let config = StoreConfig {
            retry: RetryConfig {
                max_retries: 7,
                backoff_factor: Duration::from_millis(50),
                ..Default::default()
            },
            ..Default::default()
        };
        let manager = ConnectionManager::from_store_config(config.clone());
        assert_eq!(manager.retry_config(), &config.retry);
        assert_eq!(manager.connector().config(), &config);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_setup() {
        let connector = RedisConnector::new(StoreConfig {
            port: 0,
            ..Default::default()
        });
        assert!(matches!(
            connector.connect().await,
            Err(StoreError::ConnectionSetup { .. })
        ));
    }
}
