//! Hybrid retrieval system
//!
//! Combines:
//! - BM25 lexical search (tantivy)
//! - Dense vector search (exact cosine)
//! - Weighted score fusion with divide-by-max normalization
//! - Optional reranking of the fused candidates

mod backend;
mod bm25;
mod dense;
mod fusion;
mod hybrid;
mod rerank;

pub use backend::*;
pub use bm25::*;
pub use dense::*;
pub use fusion::*;
pub use hybrid::*;
pub use rerank::*;
