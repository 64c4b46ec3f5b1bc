//! Retrieval backend traits
//!
//! The hybrid retriever talks to its sparse and dense backends through these
//! narrow seams, so index implementations stay swappable and tests can wire
//! in scripted fakes.

use crate::types::{QueryFilters, RawHit};
use async_trait::async_trait;
use std::fmt::Debug;

/// Errors a retrieval backend can surface
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The backend cannot be reached or is not operational.
    /// The retriever degrades or propagates per its fail_open setting.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Query vector length does not match the index. Always fatal to the
    /// request; a wrong-dimension search has no meaningful result.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The backend failed while executing the search
    #[error("Backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, SearchError>;

/// Lexical (keyword) search backend
///
/// Scores are in the backend's native scale and must be non-negative;
/// fusion normalizes each result list by its own maximum.
#[async_trait]
pub trait SparseSearcher: Send + Sync + Debug {
    /// Top-k keyword search with optional metadata filters
    async fn search(
        &self,
        query: &str,
        k: usize,
        filters: Option<&QueryFilters>,
    ) -> BackendResult<Vec<RawHit>>;

    /// Backend name (e.g., "bm25")
    fn name(&self) -> &str;
}

/// Vector search backend
///
/// Scores are similarities in the backend's native scale and must be
/// non-negative. The query vector length must equal `dimensions()`.
#[async_trait]
pub trait DenseSearcher: Send + Sync + Debug {
    /// Top-k nearest-neighbor search with optional metadata filters
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filters: Option<&QueryFilters>,
    ) -> BackendResult<Vec<RawHit>>;

    /// Embedding dimensions this index was built with
    fn dimensions(&self) -> usize;

    /// Backend name (e.g., "dense")
    fn name(&self) -> &str;
}
