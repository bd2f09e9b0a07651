//! Classification-typed view over a [`CacheStore`].

use crate::error::{CacheError, CacheResult};
use crate::memory::MemoryCacheStore;
use crate::redis_store::RedisCacheStore;
use crate::sqlite::SqliteCacheStore;
use crate::store::CacheStore;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use vellum_config::{CacheBackend, CacheConfig};
use vellum_core::Classification;

/// Stores [`Classification`] values as JSON under digest keys.
///
/// Every store call is bounded by `op_timeout`; a slow store counts as an
/// unavailable one.
#[derive(Clone)]
pub struct ClassificationCache {
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
    op_timeout: Duration,
}

impl ClassificationCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store: Some(store),
            ttl,
            op_timeout: Duration::from_millis(500),
        }
    }

    /// A cache that stores nothing and is never consulted.
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: Duration::ZERO,
            op_timeout: Duration::ZERO,
        }
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Build the configured backend. `sqlite_path` is used for the SQLite backend.
    pub async fn from_config(config: &CacheConfig, sqlite_path: &Path) -> CacheResult<Self> {
        let store: Arc<dyn CacheStore> = match config.backend {
            CacheBackend::Disabled => return Ok(Self::disabled()),
            CacheBackend::Memory => Arc::new(MemoryCacheStore::new()),
            CacheBackend::Sqlite => Arc::new(SqliteCacheStore::open(sqlite_path)?),
            CacheBackend::Redis => {
                let url = config
                    .redis_url
                    .as_deref()
                    .ok_or_else(|| CacheError::Other("cache.redis_url is not set".to_string()))?;
                Arc::new(RedisCacheStore::connect(url).await?)
            }
        };
        Ok(Self::new(store, config.ttl()).with_op_timeout(config.op_timeout()))
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.as_ref().map(|s| s.name()).unwrap_or("disabled")
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn bounded<T, F>(&self, op: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.op_timeout.as_millis() as u64)),
        }
    }

    /// Look up a cached classification.
    ///
    /// An entry that no longer deserializes is deleted and reported as
    /// [`CacheError::Corrupt`].
    pub async fn get(&self, key: &str) -> CacheResult<Option<Classification>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let Some(raw) = self.bounded(store.get(key)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(classification) => Ok(Some(classification)),
            Err(e) => {
                let _ = self.bounded(store.delete(key)).await;
                Err(CacheError::Corrupt(e))
            }
        }
    }

    /// Store a classification under `key` for the configured TTL.
    pub async fn put(&self, key: &str, classification: &Classification) -> CacheResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let raw = serde_json::to_string(classification)?;
        self.bounded(store.set(key, &raw, self.ttl)).await
    }

    /// Remove one entry. Returns whether it existed.
    pub async fn invalidate(&self, key: &str) -> CacheResult<bool> {
        match &self.store {
            Some(store) => self.bounded(store.delete(key)).await,
            None => Ok(false),
        }
    }

    /// Remove every entry.
    pub async fn flush(&self) -> CacheResult<usize> {
        match &self.store {
            Some(store) => store.flush().await,
            None => Ok(0),
        }
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) -> CacheResult<usize> {
        match &self.store {
            Some(store) => store.purge_expired().await,
            None => Ok(0),
        }
    }

    pub async fn ping(&self) -> CacheResult<()> {
        match &self.store {
            Some(store) => self.bounded(store.ping()).await,
            None => Ok(()),
        }
    }
}
