//! Key/value cache capability
//!
//! The merchant normalizer depends on `MerchantCache` only, so tests can hand
//! each normalizer an isolated `InMemoryCache` while the CLI uses the
//! persistent `SqliteCache`.
//!
//! Entries may carry a TTL; normalization entries are written without one and
//! live until an explicit `clear` or `delete`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Cache backend interface
#[async_trait]
pub trait MerchantCache: Send + Sync {
    /// Look up a key; expired entries read as a miss
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, optionally expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Remove a key (missing keys are not an error)
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every entry
    async fn clear(&self) -> Result<()>;

    /// Number of live entries
    async fn len(&self) -> Result<usize>;
}

/// Process-local cache backed by a `HashMap`
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, (String, Option<Instant>)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(what: &str) -> Error {
    Error::Cache(format!("{} lock poisoned", what))
}

#[async_trait]
impl MerchantCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|_| poisoned("cache"))?;
        Ok(entries.get(key).and_then(|(value, expires)| match expires {
            Some(at) if *at <= Instant::now() => None,
            _ => Some(value.clone()),
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires = ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries.write().map_err(|_| poisoned("cache"))?;
        entries.insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned("cache"))?;
        entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned("cache"))?;
        entries.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let entries = self.entries.read().map_err(|_| poisoned("cache"))?;
        let now = Instant::now();
        Ok(entries
            .values()
            .filter(|(_, expires)| expires.map_or(true, |at| at > now))
            .count())
    }
}

/// Cache that stores nothing; every read is a miss
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl MerchantCache for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
}

pub type CachePool = Pool<SqliteConnectionManager>;
pub type CacheConn = PooledConnection<SqliteConnectionManager>;

/// Persistent cache stored in a SQLite file
#[derive(Clone)]
pub struct SqliteCache {
    pool: CachePool,
    path: PathBuf,
}

impl SqliteCache {
    /// Open (or create) a cache database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
        });
        let pool = Pool::builder().max_size(4).build(manager)?;

        let cache = Self {
            pool,
            path: path.to_path_buf(),
        };
        cache.run_migrations()?;
        info!(path = %path.display(), "Opened merchant cache");
        Ok(cache)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cache_entries_expires ON cache_entries(expires_at);",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<CacheConn> {
        Ok(self.pool.get()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete entries whose TTL has passed, returning how many were removed
    pub fn purge_expired(&self) -> Result<usize> {
        let removed = self.conn()?.execute(
            "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![Utc::now().timestamp_millis()],
        )?;
        debug!(removed, "Purged expired cache entries");
        Ok(removed)
    }
}

/// Default cache database location
pub fn default_cache_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("fin-infra").join("cache.db"))
}

#[async_trait]
impl MerchantCache for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM cache_entries
                 WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, Utc::now().timestamp_millis()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let expires_at = ttl.map(|ttl| now + ttl.as_millis() as i64);
        self.conn()?.execute(
            "INSERT INTO cache_entries (key, value, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
            params![key, value, expires_at, now],
        )?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let removed = self.conn()?.execute("DELETE FROM cache_entries", [])?;
        info!(removed, "Cleared merchant cache");
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE expires_at IS NULL OR expires_at > ?1",
            params![Utc::now().timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
