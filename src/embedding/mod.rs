//! Query and document encoding with pluggable encoders
//!
//! Two encoders ship with the crate: an HTTP client for OpenAI-compatible
//! embedding APIs (hosted or self-hosted) and a deterministic hashing
//! encoder that needs no model or network.
//!
//! # Example Configuration
//!
//! ## OpenAI API
//! ```toml
//! [embedding]
//! encoder = "http"
//! endpoint = "https://api.openai.com/v1/embeddings"
//! model = "text-embedding-3-small"
//! dimensions = 1536
//! ```
//!
//! ## Local, model-free
//! ```toml
//! [embedding]
//! encoder = "hashing"
//! dimensions = 384
//! ```

mod hashing;
mod http;

pub use hashing::HashingEncoder;
pub use http::HttpEncoder;

use crate::types::Embedding;
use std::fmt::Debug;

/// Errors produced while encoding text
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("Encoding failed: {0}")]
    Failed(String),

    /// The API asked us to back off; `retry_after_ms` is its suggested
    /// delay when one was given
    #[error("Encoder rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Encoder transport error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Encoder configuration error: {0}")]
    Config(String),
}

pub type EncoderResult<T> = Result<T, EncoderError>;

/// Turns text into a fixed-size embedding.
///
/// Object safe; the retriever and the ingestor both hold one behind an
/// `Arc<dyn QueryEncoder>`.
#[async_trait::async_trait]
pub trait QueryEncoder: Send + Sync + Debug {
    async fn encode(&self, text: &str) -> EncoderResult<Embedding>;

    /// Encode many texts at once.
    ///
    /// Encoders backed by an API that batches should override this; the
    /// default just loops over `encode`.
    async fn encode_batch(&self, texts: &[String]) -> EncoderResult<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.encode(text).await?);
        }
        Ok(out)
    }

    /// Embedding width this encoder produces
    fn dimensions(&self) -> usize;

    /// Encoder name (e.g., "http", "hashing")
    fn name(&self) -> &str;
}

/// Scale a vector to unit length; the zero vector passes through unchanged
pub(crate) fn normalize_embedding(mut embedding: Embedding) -> Embedding {
    let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut embedding {
            *v /= norm;
        }
    }
    embedding
}
