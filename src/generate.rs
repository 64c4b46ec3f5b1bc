//! Answer generation
//!
//! Composes the final answer from retrieved context. The extractive
//! generator lifts the best match's stored answer verbatim; an LLM-backed
//! generator would implement the same trait.

use crate::config::GenerationConfig;
use crate::types::{Answer, RetrievedDoc, SourceRef};
use crate::util::truncate_str;
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

/// Produces an answer from retrieved documents
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, question: &str, docs: &[RetrievedDoc]) -> Result<Answer>;

    /// Generator name (e.g., "extractive")
    fn name(&self) -> &str;
}

/// Extractive generator: the best hit answers verbatim
///
/// Uses the top-ranked document's stored answer, falling back to its
/// indexed text when no dedicated answer field exists. Never hallucinates;
/// with no context it says "I don't know."
#[derive(Debug, Clone)]
pub struct ExtractiveGenerator {
    config: GenerationConfig,
}

impl ExtractiveGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        Self { config }
    }

    /// Pick cited sources, bounded by count and a context-size budget.
    /// The top document is always cited even when it alone exceeds the
    /// budget, since the answer came from it.
    fn select_sources(&self, docs: &[RetrievedDoc]) -> Vec<SourceRef> {
        let mut sources = Vec::new();
        let mut used_chars = 0usize;

        for doc in docs.iter().take(self.config.max_sources) {
            used_chars += doc.text.len();
            if used_chars > self.config.max_context_chars && !sources.is_empty() {
                break;
            }
            sources.push(SourceRef::from_doc(doc));
        }

        sources
    }
}

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    async fn generate(&self, question: &str, docs: &[RetrievedDoc]) -> Result<Answer> {
        let top = match docs.first() {
            Some(doc) => doc,
            None => {
                debug!("No retrieved context for '{}'", truncate_str(question, 50));
                return Ok(Answer::dont_know());
            }
        };

        let answer_text = match &top.metadata.answer {
            Some(answer) if !answer.trim().is_empty() => answer.clone(),
            _ => top.text.clone(),
        };

        // Fused scores live in [0, 1] but reranker scores may not
        let confidence = top.score.clamp(0.0, 1.0);

        Ok(Answer {
            answer: answer_text,
            sources: self.select_sources(docs),
            confidence,
        })
    }

    fn name(&self) -> &str {
        "extractive"
    }
}
