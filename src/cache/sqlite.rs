//! SQLite-backed shared cache tier
//!
//! A single `kv` table holds JSON payloads with absolute expiry times in
//! epoch seconds. Expired rows read as absent and are evicted lazily on
//! access; `evict_expired` sweeps the rest.

use crate::cache::store::{SharedStore, StoreResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

/// Durable cache store backed by a single SQLite database file
///
/// Safe to share across processes; writes use WAL mode so readers are not
/// blocked by a writer.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).with_context(|| {
            format!(
                "Failed to open cache database '{}'",
                path.as_ref().display()
            )
        })?;
        Self::init(conn)
    }

    /// Open an in-memory store
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory cache database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             CREATE TABLE IF NOT EXISTS kv (
                 key TEXT PRIMARY KEY,
                 value TEXT NOT NULL,
                 expires_at INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_kv_expires ON kv (expires_at);",
        )
        .context("Failed to initialize cache schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Delete every expired row; returns how many were removed
    pub fn evict_expired(&self) -> Result<usize> {
        let now = Utc::now().timestamp();
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM kv WHERE expires_at <= ?1", params![now])
            .context("Failed to evict expired cache entries")?;
        if removed > 0 {
            debug!("Evicted {} expired cache entries", removed);
        }
        Ok(removed)
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> Result<usize> {
        let now = Utc::now().timestamp();
        let count: i64 = self
            .conn
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM kv WHERE expires_at > ?1",
                params![now],
                |row| row.get(0),
            )
            .context("Failed to count cache entries")?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl SharedStore for SqliteStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Utc::now().timestamp();
        let conn = self.conn.lock();

        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, expires_at FROM kv WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to read cache entry")?;

        match row {
            Some((_, expires_at)) if expires_at <= now => {
                // Lazy eviction on read
                conn.execute(
                    "DELETE FROM kv WHERE key = ?1 AND expires_at <= ?2",
                    params![key, now],
                )
                .context("Failed to evict expired cache entry")?;
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    async fn setex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let expires_at = Utc::now().timestamp() + ttl_secs as i64;
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, value, expires_at],
            )
            .context("Failed to write cache entry")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.conn
            .lock()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .context("Failed to delete cache entry")?;
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
