//! Two-tier result cache
//!
//! Tier 1 is a per-process map with absolute expiry; tier 2 is an optional
//! shared durable store. A tier-2 hit is promoted into tier 1 with a fresh
//! full TTL, so a value can outlive its first write by at most one extra
//! TTL window when processes trade hits.
//!
//! Shared-tier failures never fail a request: reads degrade to a miss and
//! writes fall through to tier 1 only, both logged and counted.

use crate::cache::store::SharedStore;
use crate::config::CacheConfig;
use crate::metrics::ServiceMetrics;
use crate::types::ContentHash;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Which tier served a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Memory,
    Shared,
}

/// Outcome of a cache lookup
#[derive(Debug)]
pub enum CacheLookup {
    Hit {
        value: serde_json::Value,
        tier: CacheTier,
    },
    Miss,
    /// Both tiers missed and the shared tier was unreachable, so the value
    /// may exist there. Callers treat this as a miss.
    Degraded,
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// Two-tier TTL cache for serialized answers
pub struct ResultCache {
    namespace: String,
    ttl: Duration,
    memory: DashMap<String, MemoryEntry>,
    shared: Option<Arc<dyn SharedStore>>,
    metrics: Arc<ServiceMetrics>,
}

impl ResultCache {
    pub fn new(
        config: &CacheConfig,
        shared: Option<Arc<dyn SharedStore>>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            namespace: config.namespace.clone(),
            ttl: Duration::from_secs(config.ttl_secs),
            memory: DashMap::new(),
            shared,
            metrics,
        }
    }

    /// Derive the cache key for a canonical request string.
    ///
    /// Stable across processes and restarts: same namespace and raw string,
    /// same key.
    pub fn lookup_key(&self, raw: &str) -> String {
        format!("{}{}", self.namespace, ContentHash::compute(raw).as_str())
    }

    /// Look up a key, checking the memory tier first
    pub async fn get(&self, key: &str) -> CacheLookup {
        let memory_hit = self.memory.get(key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.value.clone())
            } else {
                None
            }
        });
        if let Some(value) = memory_hit {
            self.metrics.cache_memory_hits.inc();
            return CacheLookup::Hit {
                value,
                tier: CacheTier::Memory,
            };
        }
        // Expired tier-1 entries are removed on access
        self.memory
            .remove_if(key, |_, entry| entry.expires_at <= Instant::now());

        let shared = match &self.shared {
            Some(shared) => shared,
            None => {
                self.metrics.cache_misses.inc();
                return CacheLookup::Miss;
            }
        };

        match shared.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str::<serde_json::Value>(&payload) {
                Ok(value) => {
                    // Promote into tier 1 with a fresh TTL
                    self.memory.insert(
                        key.to_string(),
                        MemoryEntry {
                            value: value.clone(),
                            expires_at: Instant::now() + self.ttl,
                        },
                    );
                    self.metrics.cache_shared_hits.inc();
                    CacheLookup::Hit {
                        value,
                        tier: CacheTier::Shared,
                    }
                }
                Err(err) => {
                    warn!("Discarding corrupt cache payload for '{}': {}", key, err);
                    if let Err(err) = shared.delete(key).await {
                        debug!("Failed to delete corrupt cache entry: {}", err);
                    }
                    self.metrics.cache_misses.inc();
                    CacheLookup::Miss
                }
            },
            Ok(None) => {
                self.metrics.cache_misses.inc();
                CacheLookup::Miss
            }
            Err(err) => {
                warn!("Shared cache unavailable for reads: {}", err);
                self.metrics.cache_store_errors.inc();
                self.metrics.cache_degraded_misses.inc();
                CacheLookup::Degraded
            }
        }
    }

    /// Store a value in both tiers with the configured TTL
    pub async fn set(&self, key: &str, value: &serde_json::Value) {
        self.memory.insert(
            key.to_string(),
            MemoryEntry {
                value: value.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );

        if let Some(shared) = &self.shared {
            let payload = match serde_json::to_string(value) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!("Failed to serialize cache value for '{}': {}", key, err);
                    return;
                }
            };
            if let Err(err) = shared.setex(key, &payload, self.ttl.as_secs()).await {
                warn!("Shared cache unavailable for writes: {}", err);
                self.metrics.cache_store_errors.inc();
            }
        }
    }

    /// Remove a key from both tiers
    pub async fn invalidate(&self, key: &str) {
        self.memory.remove(key);
        if let Some(shared) = &self.shared {
            if let Err(err) = shared.delete(key).await {
                warn!("Shared cache delete failed for '{}': {}", key, err);
                self.metrics.cache_store_errors.inc();
            }
        }
    }

    /// Drop every memory-tier entry; the shared tier is left untouched
    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    /// Number of memory-tier entries, including not-yet-swept expired ones
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }
}
