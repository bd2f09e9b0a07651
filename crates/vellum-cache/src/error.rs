//! Cache error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt cache entry: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Cache operation timed out after {0} ms")]
    Timeout(u64),

    #[error("Cache task failed: {0}")]
    Task(String),

    #[error("Cache error: {0}")]
    Other(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
