//! SQLite-backed cache store, for single-host deployments.

use crate::error::{CacheError, CacheResult};
use crate::store::CacheStore;
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use tracing::info;

type ConnectionPool = Pool<SqliteConnectionManager>;

/// Current schema version.
const SCHEMA_VERSION: i32 = 1;

fn initialize_schema(conn: &Connection) -> CacheResult<()> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version == 0 {
        info!("Creating classification cache schema...");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS classification_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cache_expires ON classification_cache(expires_at);
            "#,
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Cache entries in a local SQLite file, expired lazily on read.
#[derive(Clone)]
pub struct SqliteCacheStore {
    pool: ConnectionPool,
}

impl SqliteCacheStore {
    /// Open (or create) a cache database at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Other(e.to_string()))?;
        }

        info!("Opening classification cache at: {}", path.display());

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 2000;",
            )?;
            Ok(())
        });

        let pool = Pool::builder().max_size(4).build(manager)?;
        {
            let conn = pool.get()?;
            initialize_schema(&conn)?;
        }

        Ok(Self { pool })
    }

    /// Open an in-memory cache (for testing).
    pub fn open_in_memory() -> CacheResult<Self> {
        let manager = SqliteConnectionManager::memory();
        // Memory DB only supports single connection
        let pool = Pool::builder().max_size(1).build(manager)?;
        {
            let conn = pool.get()?;
            initialize_schema(&conn)?;
        }
        Ok(Self { pool })
    }

    /// Run a closure against a pooled connection off the async executor.
    async fn with_conn<T, F>(&self, f: F) -> CacheResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> CacheResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&*conn)
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM classification_cache WHERE key = ?1 AND expires_at > ?2",
                    params![key, now_millis()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let now = now_millis();
            conn.execute(
                "INSERT INTO classification_cache (key, value, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     created_at = excluded.created_at,
                     expires_at = excluded.expires_at",
                params![key, value, now, now.saturating_add(ttl_ms)],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let removed =
                conn.execute("DELETE FROM classification_cache WHERE key = ?1", params![key])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn flush(&self) -> CacheResult<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM classification_cache", [])?))
            .await
    }

    async fn purge_expired(&self) -> CacheResult<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM classification_cache WHERE expires_at <= ?1",
                params![now_millis()],
            )?)
        })
        .await
    }

    async fn ping(&self) -> CacheResult<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}
