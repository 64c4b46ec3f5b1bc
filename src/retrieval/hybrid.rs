//! Hybrid retrieval combining sparse and dense search

use crate::config::RetrievalConfig;
use crate::embedding::QueryEncoder;
use crate::metrics::{Counter, ServiceMetrics, Timer};
use crate::retrieval::backend::{DenseSearcher, SearchError, SparseSearcher};
use crate::retrieval::fusion::{fuse, FusionConfig};
use crate::retrieval::rerank::Reranker;
use crate::types::{Query, RawHit, RetrievedDoc};
use crate::util::truncate_str;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hybrid retrieval engine combining keyword and vector search
///
/// Owns no index state; backends, encoder and reranker are injected so
/// the orchestration can be tested against scripted implementations.
pub struct HybridRetriever {
    /// Lexical search backend
    sparse: Arc<dyn SparseSearcher>,
    /// Vector search backend
    dense: Arc<dyn DenseSearcher>,
    /// Query encoder feeding the dense side
    encoder: Arc<dyn QueryEncoder>,
    /// Optional reranking stage
    reranker: Option<Arc<dyn Reranker>>,
    /// Configuration
    config: RetrievalConfig,
    metrics: Arc<ServiceMetrics>,
}

impl HybridRetriever {
    pub fn new(
        sparse: Arc<dyn SparseSearcher>,
        dense: Arc<dyn DenseSearcher>,
        encoder: Arc<dyn QueryEncoder>,
        reranker: Option<Arc<dyn Reranker>>,
        config: RetrievalConfig,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            sparse,
            dense,
            encoder,
            reranker,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve the top documents for a query
    pub async fn retrieve(&self, query: &Query) -> Result<Vec<RetrievedDoc>> {
        if query.text.trim().is_empty() || query.top_k == 0 {
            return Ok(Vec::new());
        }

        // Over-fetch per backend so fusion and reranking have candidates
        // beyond the final cut
        let candidate_count = query.top_k * self.config.candidate_multiplier;
        let filters = query.filters.as_ref();

        let timer = Timer::start();
        let embedding = self
            .encoder
            .encode(&query.text)
            .await
            .context("Failed to encode query")?;
        timer.record(&self.metrics.encode_latency);
        self.metrics.encode_requests_total.inc();

        // Both backends run concurrently; fusion waits for both outcomes
        let (sparse_res, dense_res) = tokio::join!(
            self.sparse.search(&query.text, candidate_count, filters),
            self.dense.search(&embedding, candidate_count, filters),
        );

        let sparse_hits = self.resolve_backend(
            sparse_res,
            self.sparse.name(),
            &self.metrics.sparse_degraded_total,
        )?;
        let dense_hits = self.resolve_backend(
            dense_res,
            self.dense.name(),
            &self.metrics.dense_degraded_total,
        )?;

        let fusion_config = FusionConfig {
            alpha: self.config.alpha,
        };
        let mut results = fuse(&sparse_hits, &dense_hits, &fusion_config);
        results.truncate(candidate_count);

        if self.config.enable_reranking {
            if let Some(reranker) = &self.reranker {
                results = self
                    .rerank_blocking(&query.text, results, reranker.clone())
                    .await;
            }
        }

        results.truncate(query.top_k);

        info!(
            "Hybrid retrieval for '{}': {} results",
            truncate_str(&query.text, 50),
            results.len()
        );

        Ok(results)
    }

    /// Apply the fail-open policy to one backend outcome
    fn resolve_backend(
        &self,
        result: Result<Vec<RawHit>, SearchError>,
        backend: &str,
        degraded_counter: &Counter,
    ) -> Result<Vec<RawHit>> {
        match result {
            Ok(hits) => {
                debug!("{} search: {} results", backend, hits.len());
                Ok(hits)
            }
            // A wrong-size query vector never degrades: the encoder and the
            // index disagree, and every request would fail the same way
            Err(err @ SearchError::DimensionMismatch { .. }) => {
                Err(err).with_context(|| format!("{} search failed", backend))
            }
            Err(err) if self.config.fail_open => {
                warn!("{} search degraded, continuing without it: {}", backend, err);
                degraded_counter.inc();
                Ok(Vec::new())
            }
            Err(err) => Err(err).with_context(|| format!("{} search failed", backend)),
        }
    }

    /// Run the reranker on a blocking worker; fall back to the fused order
    /// if it fails
    async fn rerank_blocking(
        &self,
        query_text: &str,
        fused: Vec<RetrievedDoc>,
        reranker: Arc<dyn Reranker>,
    ) -> Vec<RetrievedDoc> {
        if fused.is_empty() {
            return fused;
        }

        let timer = Timer::start();
        let query = query_text.to_string();
        let docs = fused.clone();

        let outcome = tokio::task::spawn_blocking(move || reranker.rerank(&query, &docs)).await;
        timer.record(&self.metrics.rerank_latency);

        match outcome {
            Ok(Ok(reranked)) => reranked,
            Ok(Err(err)) => {
                warn!("Reranking failed, keeping fused order: {}", err);
                self.metrics.rerank_failures_total.inc();
                fused
            }
            Err(err) => {
                warn!("Reranking task panicked, keeping fused order: {}", err);
                self.metrics.rerank_failures_total.inc();
                fused
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EncoderError, EncoderResult, HashingEncoder};
    use crate::retrieval::backend::BackendResult;
    use crate::retrieval::rerank::{RerankError, TermOverlapReranker};
    use crate::types::{DocMetadata, Embedding, QueryFilters};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const DIMS: usize = 8;

    fn hit(id: &str, score: f32) -> RawHit {
        RawHit {
            id: id.to_string(),
            text: format!("document {}", id),
            metadata: DocMetadata::default(),
            score,
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum FailMode {
        None,
        Unavailable,
        DimensionMismatch,
    }

    #[derive(Debug)]
    struct FakeSparse {
        hits: Vec<RawHit>,
        fail: FailMode,
        seen_k: Mutex<Option<usize>>,
        seen_filters: Mutex<Option<QueryFilters>>,
    }

    impl FakeSparse {
        fn with_hits(hits: Vec<RawHit>) -> Self {
            Self {
                hits,
                fail: FailMode::None,
                seen_k: Mutex::new(None),
                seen_filters: Mutex::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                hits: Vec::new(),
                fail: FailMode::Unavailable,
                seen_k: Mutex::new(None),
                seen_filters: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl SparseSearcher for FakeSparse {
        async fn search(
            &self,
            _query: &str,
            k: usize,
            filters: Option<&QueryFilters>,
        ) -> BackendResult<Vec<RawHit>> {
            *self.seen_k.lock() = Some(k);
            *self.seen_filters.lock() = filters.cloned();
            match self.fail {
                FailMode::None => Ok(self.hits.iter().take(k).cloned().collect()),
                FailMode::Unavailable => {
                    Err(SearchError::Unavailable("scripted outage".to_string()))
                }
                FailMode::DimensionMismatch => Err(SearchError::DimensionMismatch {
                    expected: DIMS,
                    actual: 2,
                }),
            }
        }

        fn name(&self) -> &str {
            "bm25"
        }
    }

    #[derive(Debug)]
    struct FakeDense {
        hits: Vec<RawHit>,
        fail: FailMode,
    }

    impl FakeDense {
        fn with_hits(hits: Vec<RawHit>) -> Self {
            Self {
                hits,
                fail: FailMode::None,
            }
        }

        fn failing(fail: FailMode) -> Self {
            Self {
                hits: Vec::new(),
                fail,
            }
        }
    }

    #[async_trait]
    impl DenseSearcher for FakeDense {
        async fn search(
            &self,
            _vector: &[f32],
            k: usize,
            _filters: Option<&QueryFilters>,
        ) -> BackendResult<Vec<RawHit>> {
            match self.fail {
                FailMode::None => Ok(self.hits.iter().take(k).cloned().collect()),
                FailMode::Unavailable => {
                    Err(SearchError::Unavailable("scripted outage".to_string()))
                }
                FailMode::DimensionMismatch => Err(SearchError::DimensionMismatch {
                    expected: DIMS,
                    actual: 2,
                }),
            }
        }

        fn dimensions(&self) -> usize {
            DIMS
        }

        fn name(&self) -> &str {
            "dense"
        }
    }

    #[derive(Debug)]
    struct FailingEncoder;

    #[async_trait]
    impl QueryEncoder for FailingEncoder {
        async fn encode(&self, _text: &str) -> EncoderResult<Embedding> {
            Err(EncoderError::Failed("scripted encoder outage".to_string()))
        }

        fn dimensions(&self) -> usize {
            DIMS
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[derive(Debug)]
    struct FailingReranker;

    impl Reranker for FailingReranker {
        fn name(&self) -> &str {
            "failing"
        }

        fn is_loaded(&self) -> bool {
            true
        }

        fn ensure_loaded(&self) -> Result<(), RerankError> {
            Ok(())
        }

        fn rerank(
            &self,
            _query: &str,
            _docs: &[RetrievedDoc],
        ) -> Result<Vec<RetrievedDoc>, RerankError> {
            Err(RerankError::Failed("scripted failure".to_string()))
        }
    }

    struct TestHarness {
        retriever: HybridRetriever,
        metrics: Arc<ServiceMetrics>,
    }

    impl TestHarness {
        fn new(sparse: FakeSparse, dense: FakeDense, config: RetrievalConfig) -> Self {
            Self::with_reranker(sparse, dense, config, None)
        }

        fn with_reranker(
            sparse: FakeSparse,
            dense: FakeDense,
            config: RetrievalConfig,
            reranker: Option<Arc<dyn Reranker>>,
        ) -> Self {
            let metrics = ServiceMetrics::shared();
            let retriever = HybridRetriever::new(
                Arc::new(sparse),
                Arc::new(dense),
                Arc::new(HashingEncoder::new(DIMS)),
                reranker,
                config,
                metrics.clone(),
            );
            Self { retriever, metrics }
        }
    }

    fn config(fail_open: bool) -> RetrievalConfig {
        RetrievalConfig {
            fail_open,
            ..Default::default()
        }
    }

    // ========================================================================
    // Fusion behavior through the full retrieval path
    // ========================================================================

    #[tokio::test]
    async fn test_fused_ordering_and_scores() {
        let sparse = FakeSparse::with_hits(vec![hit("A", 10.0), hit("B", 5.0)]);
        let dense = FakeDense::with_hits(vec![hit("B", 0.9), hit("C", 0.3)]);
        let harness = TestHarness::new(sparse, dense, config(true));

        let results = harness
            .retriever
            .retrieve(&Query::new("how do refunds work", 3))
            .await
            .unwrap();

        // alpha 0.5: A = 0.5*1.0, B = 0.5*0.5 + 0.5*1.0, C = 0.5*(0.3/0.9)
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "B");
        assert_eq!(results[1].id, "A");
        assert_eq!(results[2].id, "C");
        assert!((results[0].score - 0.75).abs() < 1e-6);
        assert!((results[1].score - 0.5).abs() < 1e-6);
        assert!((results[2].score - 1.0 / 6.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_truncates_to_top_k() {
        let sparse = FakeSparse::with_hits(vec![hit("A", 10.0), hit("B", 5.0)]);
        let dense = FakeDense::with_hits(vec![hit("B", 0.9), hit("C", 0.3)]);
        let harness = TestHarness::new(sparse, dense, config(true));

        let results = harness
            .retriever
            .retrieve(&Query::new("how do refunds work", 2))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "B");
        assert_eq!(results[1].id, "A");
    }

    #[tokio::test]
    async fn test_backends_asked_for_candidate_count() {
        let sparse = Arc::new(FakeSparse::with_hits(vec![hit("A", 1.0)]));
        let cfg = RetrievalConfig {
            candidate_multiplier: 3,
            ..Default::default()
        };
        let retriever = HybridRetriever::new(
            sparse.clone(),
            Arc::new(FakeDense::with_hits(vec![])),
            Arc::new(HashingEncoder::new(DIMS)),
            None,
            cfg,
            ServiceMetrics::shared(),
        );

        retriever.retrieve(&Query::new("query", 4)).await.unwrap();

        assert_eq!(*sparse.seen_k.lock(), Some(12));
    }

    #[tokio::test]
    async fn test_filters_forwarded_to_backends() {
        let sparse = Arc::new(FakeSparse::with_hits(vec![hit("A", 1.0)]));
        let retriever = HybridRetriever::new(
            sparse.clone(),
            Arc::new(FakeDense::with_hits(vec![])),
            Arc::new(HashingEncoder::new(DIMS)),
            None,
            RetrievalConfig::default(),
            ServiceMetrics::shared(),
        );

        let filters = QueryFilters {
            section: Some("Billing".to_string()),
            ..Default::default()
        };
        retriever
            .retrieve(&Query::new("refund", 3).with_filters(filters.clone()))
            .await
            .unwrap();

        assert_eq!(*sparse.seen_filters.lock(), Some(filters));
    }

    // ========================================================================
    // Input validation
    // ========================================================================

    #[tokio::test]
    async fn test_empty_query_returns_empty() {
        let harness = TestHarness::new(
            FakeSparse::with_hits(vec![hit("A", 1.0)]),
            FakeDense::with_hits(vec![]),
            config(true),
        );
        let results = harness.retriever.retrieve(&Query::new("", 5)).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_whitespace_query_returns_empty() {
        let harness = TestHarness::new(
            FakeSparse::with_hits(vec![hit("A", 1.0)]),
            FakeDense::with_hits(vec![]),
            config(true),
        );
        let results = harness
            .retriever
            .retrieve(&Query::new("   \t\n  ", 5))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_top_k_zero_returns_empty() {
        let sparse = FakeSparse::with_hits(vec![hit("A", 1.0)]);
        let harness = TestHarness::new(sparse, FakeDense::with_hits(vec![]), config(true));
        let results = harness
            .retriever
            .retrieve(&Query::new("query", 0))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    // ========================================================================
    // Degraded operation
    // ========================================================================

    #[tokio::test]
    async fn test_fail_open_continues_without_sparse() {
        let harness = TestHarness::new(
            FakeSparse::failing(),
            FakeDense::with_hits(vec![hit("C", 0.8)]),
            config(true),
        );

        let results = harness
            .retriever
            .retrieve(&Query::new("query", 5))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "C");
        assert_eq!(harness.metrics.sparse_degraded_total.get(), 1);
        assert_eq!(harness.metrics.dense_degraded_total.get(), 0);
    }

    #[tokio::test]
    async fn test_fail_open_continues_without_dense() {
        let harness = TestHarness::new(
            FakeSparse::with_hits(vec![hit("A", 2.0)]),
            FakeDense::failing(FailMode::Unavailable),
            config(true),
        );

        let results = harness
            .retriever
            .retrieve(&Query::new("query", 5))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "A");
        assert_eq!(harness.metrics.dense_degraded_total.get(), 1);
    }

    #[tokio::test]
    async fn test_fail_closed_propagates_backend_error() {
        let harness = TestHarness::new(
            FakeSparse::failing(),
            FakeDense::with_hits(vec![hit("C", 0.8)]),
            config(false),
        );

        let err = harness
            .retriever
            .retrieve(&Query::new("query", 5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bm25 search failed"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fatal_despite_fail_open() {
        let harness = TestHarness::new(
            FakeSparse::with_hits(vec![hit("A", 2.0)]),
            FakeDense::failing(FailMode::DimensionMismatch),
            config(true),
        );

        let err = harness
            .retriever
            .retrieve(&Query::new("query", 5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dense search failed"));
        assert_eq!(harness.metrics.dense_degraded_total.get(), 0);
    }

    #[tokio::test]
    async fn test_encoder_failure_is_fatal() {
        let retriever = HybridRetriever::new(
            Arc::new(FakeSparse::with_hits(vec![hit("A", 1.0)])),
            Arc::new(FakeDense::with_hits(vec![])),
            Arc::new(FailingEncoder),
            None,
            config(true),
            ServiceMetrics::shared(),
        );

        let err = retriever
            .retrieve(&Query::new("query", 5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to encode query"));
    }

    // ========================================================================
    // Reranking
    // ========================================================================

    #[tokio::test]
    async fn test_reranking_reorders_results() {
        let sparse = FakeSparse::with_hits(vec![
            RawHit {
                id: "faq_1".to_string(),
                text: "billing refund policy details".to_string(),
                metadata: DocMetadata::default(),
                score: 10.0,
            },
            RawHit {
                id: "faq_2".to_string(),
                text: "how to reset password steps".to_string(),
                metadata: DocMetadata::default(),
                score: 5.0,
            },
        ]);
        let cfg = RetrievalConfig {
            enable_reranking: true,
            ..Default::default()
        };
        let harness = TestHarness::with_reranker(
            sparse,
            FakeDense::with_hits(vec![]),
            cfg,
            Some(Arc::new(TermOverlapReranker)),
        );

        let results = harness
            .retriever
            .retrieve(&Query::new("reset password", 2))
            .await
            .unwrap();

        // Fused order has faq_1 first; full term overlap promotes faq_2
        assert_eq!(results[0].id, "faq_2");
        assert_eq!(results[1].id, "faq_1");
    }

    #[tokio::test]
    async fn test_rerank_failure_falls_back_to_fused_order() {
        let sparse = FakeSparse::with_hits(vec![hit("A", 10.0), hit("B", 5.0)]);
        let cfg = RetrievalConfig {
            enable_reranking: true,
            ..Default::default()
        };
        let harness = TestHarness::with_reranker(
            sparse,
            FakeDense::with_hits(vec![]),
            cfg,
            Some(Arc::new(FailingReranker)),
        );

        let results = harness
            .retriever
            .retrieve(&Query::new("query", 2))
            .await
            .unwrap();

        assert_eq!(results[0].id, "A");
        assert_eq!(results[1].id, "B");
        assert_eq!(harness.metrics.rerank_failures_total.get(), 1);
    }

    #[tokio::test]
    async fn test_reranking_disabled_keeps_fused_order() {
        let sparse = FakeSparse::with_hits(vec![hit("A", 10.0), hit("B", 5.0)]);
        let harness = TestHarness::with_reranker(
            sparse,
            FakeDense::with_hits(vec![]),
            config(true),
            Some(Arc::new(TermOverlapReranker)),
        );

        let results = harness
            .retriever
            .retrieve(&Query::new("document B", 2))
            .await
            .unwrap();

        assert_eq!(results[0].id, "A");
        assert_eq!(results[1].id, "B");
    }
}
