//! Faqdex: hybrid retrieval and answer caching for FAQ corpora
//!
//! A self-contained FAQ question-answering service, featuring:
//! - Hybrid retrieval (BM25 via Tantivy + dense vectors, score fusion)
//! - Optional cross-encoder reranking via ONNX Runtime (`onnx` feature)
//! - Pluggable query encoders (OpenAI-compatible HTTP, deterministic hashing)
//! - Two-tier result cache (in-process + shared SQLite, uniform TTL)
//! - Extractive answer generation with source citations
//! - REST API with bearer-token auth and Prometheus metrics

pub mod api;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod generate;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod retrieval;
pub mod types;
pub mod util;

pub use config::Config;
pub use types::*;
