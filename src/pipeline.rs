//! Request pipeline: cache, retrieve, generate, cache
//!
//! `RagPipeline` answers questions end to end. A cached answer short-circuits
//! retrieval entirely; a fresh answer is computed through the hybrid
//! retriever and the generator, then written back to the cache for next time.

use crate::cache::{CacheLookup, CacheTier, ResultCache};
use crate::generate::AnswerGenerator;
use crate::metrics::{ServiceMetrics, Timer};
use crate::retrieval::HybridRetriever;
use crate::types::{Answer, Query, QueryFilters, RetrievedDoc};
use crate::util::truncate_str;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bump to invalidate every cached answer after a format change
const CACHE_KEY_VERSION: &str = "v1";

/// Where an answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the in-process tier
    Memory,
    /// Served from the shared store
    Shared,
    /// Computed fresh, cache consulted
    Miss,
    /// Computed fresh; the shared store was unreachable
    Degraded,
    /// Computed fresh, cache not consulted
    Bypass,
}

impl CacheStatus {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheStatus::Memory | CacheStatus::Shared)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Memory => "memory",
            CacheStatus::Shared => "shared",
            CacheStatus::Miss => "miss",
            CacheStatus::Degraded => "degraded",
            CacheStatus::Bypass => "bypass",
        }
    }
}

/// Parameters of one ask request
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub question: String,
    /// Result cut; the retrieval config default when unset
    pub top_k: Option<usize>,
    pub lang: Option<String>,
    pub section: Option<String>,
    /// Skip the cache for this request, both lookup and write-back
    pub no_cache: bool,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k: None,
            lang: None,
            section: None,
            no_cache: false,
        }
    }
}

/// An answered question with its cache disposition and timing
#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub answer: Answer,
    pub cache_status: CacheStatus,
    pub query_time_ms: u64,
}

/// End-to-end question answering
pub struct RagPipeline {
    retriever: Arc<HybridRetriever>,
    generator: Arc<dyn AnswerGenerator>,
    cache: Option<Arc<ResultCache>>,
    metrics: Arc<ServiceMetrics>,
}

impl RagPipeline {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        generator: Arc<dyn AnswerGenerator>,
        cache: Option<Arc<ResultCache>>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            retriever,
            generator,
            cache,
            metrics,
        }
    }

    /// Answer a question, consulting the cache first
    pub async fn ask(&self, request: &AskRequest) -> Result<AskOutcome> {
        self.metrics.asks_total.inc();
        let timer = Timer::start();

        let result = self.ask_inner(request).await;
        let elapsed = timer.record(&self.metrics.ask_latency);

        match result {
            Ok((answer, cache_status)) => {
                info!(
                    "Answered '{}' in {}ms (cache: {})",
                    truncate_str(&request.question, 50),
                    elapsed.as_millis(),
                    cache_status.as_str()
                );
                Ok(AskOutcome {
                    answer,
                    cache_status,
                    query_time_ms: elapsed.as_millis() as u64,
                })
            }
            Err(err) => {
                self.metrics.asks_failed.inc();
                Err(err)
            }
        }
    }

    async fn ask_inner(&self, request: &AskRequest) -> Result<(Answer, CacheStatus)> {
        let top_k = request.top_k.unwrap_or(self.retriever.config().top_k);
        let filters = QueryFilters {
            lang: request.lang.clone(),
            section: request.section.clone(),
            ..Default::default()
        };

        let cache = if request.no_cache {
            None
        } else {
            self.cache.as_ref()
        };
        let key = cache.map(|c| c.lookup_key(&raw_key(&request.question, top_k, &filters)));

        let mut fresh_status = if cache.is_some() {
            CacheStatus::Miss
        } else {
            CacheStatus::Bypass
        };

        if let (Some(cache), Some(key)) = (cache, &key) {
            match cache.get(key).await {
                CacheLookup::Hit { value, tier } => match serde_json::from_value::<Answer>(value) {
                    Ok(answer) => {
                        let status = match tier {
                            CacheTier::Memory => CacheStatus::Memory,
                            CacheTier::Shared => CacheStatus::Shared,
                        };
                        debug!(
                            "Cache hit ({}) for '{}'",
                            status.as_str(),
                            truncate_str(&request.question, 50)
                        );
                        return Ok((answer, status));
                    }
                    Err(err) => {
                        // Only this module writes these values, so a shape
                        // mismatch means a stale format; drop it and recompute
                        warn!("Discarding undecodable cached answer: {}", err);
                        cache.invalidate(key).await;
                    }
                },
                CacheLookup::Miss => {}
                CacheLookup::Degraded => fresh_status = CacheStatus::Degraded,
            }
        }

        let query = Query::new(request.question.clone(), top_k).with_filters(filters);
        let docs = self.retriever.retrieve(&query).await?;
        let answer = self
            .generator
            .generate(&request.question, &docs)
            .await
            .context("Answer generation failed")?;

        if let (Some(cache), Some(key)) = (cache, &key) {
            match serde_json::to_value(&answer) {
                Ok(value) => cache.set(key, &value).await,
                Err(err) => warn!("Failed to serialize answer for caching: {}", err),
            }
        }

        Ok((answer, fresh_status))
    }

    /// The configured result count used when a request leaves `top_k` unset
    pub fn default_top_k(&self) -> usize {
        self.retriever.config().top_k
    }

    /// Raw retrieval without generation or caching
    pub async fn search(&self, query: &Query) -> Result<Vec<RetrievedDoc>> {
        self.metrics.searches_total.inc();
        let timer = Timer::start();

        let result = self.retriever.retrieve(query).await;
        timer.record(&self.metrics.search_latency);
        if result.is_err() {
            self.metrics.searches_failed.inc();
        }
        result
    }
}

/// Canonical cache key input; every parameter that changes the answer
/// must appear here
fn raw_key(question: &str, top_k: usize, filters: &QueryFilters) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        question,
        top_k,
        filters.lang.as_deref().unwrap_or(""),
        filters.section.as_deref().unwrap_or(""),
        CACHE_KEY_VERSION
    )
}
