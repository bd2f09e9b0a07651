//! Redis-backed cache store, shared between hosts.

use crate::digest::KEY_PREFIX;
use crate::error::CacheResult;
use crate::store::CacheStore;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

/// Cache entries as Redis strings with native expiry.
#[derive(Clone)]
pub struct RedisCacheStore {
    connection: MultiplexedConnection,
}

impl RedisCacheStore {
    /// Connect to the Redis server at `redis_url`.
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        tracing::info!("Connected to Redis cache at {}", redis_url);
        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        // SETEX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let removed: usize = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn flush(&self) -> CacheResult<usize> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = conn.keys(format!("{}*", KEY_PREFIX)).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: usize = conn.del(&keys).await?;
        tracing::warn!(removed, "Flushed classification keys from Redis");
        Ok(removed)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_url() -> String {
        std::env::var("TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis
    async fn test_redis_roundtrip() {
        let store = RedisCacheStore::connect(&redis_url()).await.unwrap();
        store.ping().await.unwrap();

        let key = format!("{}test-roundtrip", KEY_PREFIX);
        store.set(&key, "v", Duration::from_secs(30)).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("v"));
        assert!(store.delete(&key).await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis
    async fn test_redis_flush_only_touches_prefix() {
        let store = RedisCacheStore::connect(&redis_url()).await.unwrap();
        let mut conn = store.connection.clone();
        conn.set::<_, _, ()>("unrelated:key", "keep").await.unwrap();

        store
            .set(&format!("{}a", KEY_PREFIX), "1", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(store.flush().await.unwrap() >= 1);

        let kept: Option<String> = conn.get("unrelated:key").await.unwrap();
        assert_eq!(kept.as_deref(), Some("keep"));
        conn.del::<_, ()>("unrelated:key").await.unwrap();
    }
}
