//! Shared cache store seam
//!
//! The durable cache tier lives behind this trait so the result cache does
//! not care whether it talks to SQLite, a remote store, or a test double.

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// Errors from the shared store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached or is not operational
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store failed while executing the operation
    #[error("Store error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable key-value store with per-key TTLs
///
/// Values are opaque strings (the result cache stores JSON). Expired keys
/// read as absent.
#[async_trait]
pub trait SharedStore: Send + Sync + Debug {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value` under `key` with a time-to-live in seconds
    async fn setex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Store name (e.g., "sqlite")
    fn name(&self) -> &str;
}
