//! Core types for the faqdex engine

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Unique identifier for an indexed FAQ document
pub type DocId = String;

/// Dense vector produced by an encoder
pub type Embedding = Vec<f32>;

// ============================================================================
// Identity
// ============================================================================

/// Hex-encoded SHA-256 digest of a piece of text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn compute(content: &str) -> Self {
        ContentHash(hex::encode(Sha256::digest(content.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Documents
// ============================================================================

fn default_lang() -> String {
    "en".to_string()
}

/// Metadata attached to an indexed FAQ document.
///
/// Fields the engine itself reads are typed; anything else a source wants to
/// carry rides in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Passthrough fields the engine does not interpret
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl Default for DocMetadata {
    fn default() -> Self {
        Self {
            question: None,
            answer: None,
            section: None,
            lang: default_lang(),
            extra: HashMap::new(),
        }
    }
}

/// An indexable FAQ document: one question/answer pair in combined form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqDoc {
    pub id: DocId,
    /// Combined text, `Q: ...\nA: ...`
    pub text: String,
    pub metadata: DocMetadata,
}

impl FaqDoc {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: DocMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: DocMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

// ============================================================================
// Retrieval
// ============================================================================

/// A single hit as returned by one retrieval backend, score in the backend's
/// native scale (BM25 weight, cosine similarity)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    pub id: DocId,
    pub text: String,
    pub metadata: DocMetadata,
    pub score: f32,
}

/// A fused (and possibly reranked) retrieval result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDoc {
    pub id: DocId,
    pub text: String,
    pub metadata: DocMetadata,
    /// Final ranking score: fused score, replaced by the reranker score when
    /// reranking ran
    pub score: f32,
    /// Normalized per-backend contributions, absent when the backend did not
    /// return this document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_score: Option<f32>,
    /// Which retrieval methods matched (sparse, dense)
    pub matched_by: Vec<String>,
}

/// A retrieval request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub top_k: usize,
    pub filters: Option<QueryFilters>,
}

impl Query {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            filters: None,
        }
    }

    pub fn with_filters(mut self, filters: QueryFilters) -> Self {
        self.filters = Some(filters);
        self
    }
}

/// Optional query filters, forwarded to both retrieval backends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    pub lang: Option<String>,
    pub section: Option<String>,
    pub source_ids: Option<Vec<DocId>>,
}

impl QueryFilters {
    pub fn is_empty(&self) -> bool {
        self.lang.is_none() && self.section.is_none() && self.source_ids.is_none()
    }

    /// Whether a document passes every set filter.
    pub fn matches(&self, id: &str, metadata: &DocMetadata) -> bool {
        if let Some(ref lang) = self.lang {
            if !metadata.lang.eq_ignore_ascii_case(lang) {
                return false;
            }
        }
        if let Some(ref section) = self.section {
            match metadata.section {
                Some(ref s) if s.eq_ignore_ascii_case(section) => {}
                _ => return false,
            }
        }
        if let Some(ref ids) = self.source_ids {
            if !ids.iter().any(|i| i == id) {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Answers
// ============================================================================

/// A source citation attached to an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: DocId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub score: f32,
}

impl SourceRef {
    pub fn from_doc(doc: &RetrievedDoc) -> Self {
        Self {
            id: doc.id.clone(),
            question: doc.metadata.question.clone(),
            section: doc.metadata.section.clone(),
            score: doc.score,
        }
    }
}

/// A generated answer with its citations.
///
/// This is the value the pipeline caches, so it stays plain serde data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence: f32,
}

impl Answer {
    /// The fixed fallback when retrieval produced nothing usable.
    pub fn dont_know() -> Self {
        Self {
            answer: "I don't know.".to_string(),
            sources: Vec::new(),
            confidence: 0.0,
        }
    }
}
