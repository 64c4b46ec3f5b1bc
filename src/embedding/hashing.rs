//! Deterministic hashing encoder
//!
//! Feature-hashes whitespace tokens into a fixed-size vector. Embeddings are
//! deterministic for the same content and token overlap drives similarity, so
//! retrieval behaves sensibly in development and tests without a model.
//! For production search quality use the HTTP encoder.

use super::{normalize_embedding, EncoderResult, QueryEncoder};
use crate::types::Embedding;

/// Model-free encoder using the hashing trick over lowercased tokens
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimensions: usize,
}

impl HashingEncoder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn encode_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();
        for token in lowered.split_whitespace() {
            let hash = xxhash_rust::xxh3::xxh3_64(token.as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            // Signed contributions keep unrelated texts near-orthogonal
            let sign = if hash & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize_embedding(vector)
    }
}

#[async_trait::async_trait]
impl QueryEncoder for HashingEncoder {
    async fn encode(&self, text: &str) -> EncoderResult<Embedding> {
        Ok(self.encode_text(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
