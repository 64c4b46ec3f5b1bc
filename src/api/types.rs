//! HTTP API request/response types
//!
//! Wire shapes are kept separate from the domain types so the JSON contract
//! can stay stable while internals change.

use serde::{Deserialize, Serialize};

use crate::pipeline::AskOutcome;
use crate::types::{RetrievedDoc, SourceRef};

/// Body of `POST /v1/ask`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Number of documents to retrieve (service default when omitted)
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Restrict retrieval to entries in this language
    #[serde(default)]
    pub lang: Option<String>,
    /// Restrict retrieval to one FAQ section
    #[serde(default)]
    pub section: Option<String>,
    /// Bypass the result cache for this request
    #[serde(default)]
    pub no_cache: bool,
}

/// Reply of `POST /v1/ask`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<SourceJson>,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Whether the answer came from the cache
    pub cached: bool,
    pub query_time_ms: u64,
}

impl From<AskOutcome> for AskResponse {
    fn from(outcome: AskOutcome) -> Self {
        Self {
            answer: outcome.answer.answer,
            sources: outcome.answer.sources.iter().map(SourceJson::from).collect(),
            confidence: outcome.answer.confidence,
            cached: outcome.cache_status.is_hit(),
            query_time_ms: outcome.query_time_ms,
        }
    }
}

/// One cited FAQ entry inside an ask reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceJson {
    pub id: String,
    pub question: Option<String>,
    pub section: Option<String>,
    pub score: f32,
}

impl From<&SourceRef> for SourceJson {
    fn from(source: &SourceRef) -> Self {
        Self {
            id: source.id.clone(),
            question: source.question.clone(),
            section: source.section.clone(),
            score: source.score,
        }
    }
}

/// Body of `POST /v1/search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Number of results to return (service default when omitted)
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
}

/// One ranked hit inside a search reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHitJson {
    pub id: String,
    /// Combined question/answer text
    pub text: String,
    pub question: Option<String>,
    pub section: Option<String>,
    pub score: f32,
    /// Which retrieval methods matched (sparse, dense)
    pub matched_by: Vec<String>,
}

impl From<&RetrievedDoc> for SearchHitJson {
    fn from(doc: &RetrievedDoc) -> Self {
        Self {
            id: doc.id.clone(),
            text: doc.text.clone(),
            question: doc.metadata.question.clone(),
            section: doc.metadata.section.clone(),
            score: doc.score,
            matched_by: doc.matched_by.clone(),
        }
    }
}

/// Reply of `POST /v1/search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHitJson>,
    pub query_time_ms: u64,
}

/// Reply of `GET /v1/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
}

/// JSON error body with a stable machine-readable code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn unauthorized() -> Self {
        Self::new("UNAUTHORIZED", "Missing or unrecognized API key")
    }
}
