//! Vellum Cache - Deterministic, TTL-bound cache for classification results.
//!
//! The cache is a performance optimization only. Every backend error surfaces
//! as a [`CacheError`] that callers log and count before falling through to
//! the remote classifier.

mod cache;
mod digest;
mod error;
mod memory;
mod redis_store;
mod sqlite;
mod store;

pub use cache::ClassificationCache;
pub use digest::{cache_key, normalize_metadata, normalize_text, KEY_PREFIX};
pub use error::{CacheError, CacheResult};
pub use memory::MemoryCacheStore;
pub use redis_store::RedisCacheStore;
pub use sqlite::SqliteCacheStore;
pub use store::CacheStore;
