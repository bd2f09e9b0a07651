//! The key-value store seam behind the classification cache.

use crate::error::CacheResult;
use async_trait::async_trait;
use std::time::Duration;

/// A string key-value store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Fetch a live entry. Expired entries read as absent.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Insert or replace an entry that expires after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Remove one entry. Returns whether it existed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Remove every classification entry. Returns how many were removed.
    async fn flush(&self) -> CacheResult<usize>;

    /// Drop expired entries eagerly, for stores that do not expire on their own.
    async fn purge_expired(&self) -> CacheResult<usize> {
        Ok(0)
    }

    /// Round-trip to the backing store.
    async fn ping(&self) -> CacheResult<()>;
}
