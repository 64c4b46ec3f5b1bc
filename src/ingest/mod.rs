//! FAQ ingestion
//!
//! Parses FAQ files and writes them into both retrieval indexes in one
//! pass, committing once at the end.

mod chunk;
mod faq;

pub use chunk::*;
pub use faq::*;

use crate::config::IngestConfig;
use crate::embedding::QueryEncoder;
use crate::metrics::ServiceMetrics;
use crate::retrieval::{FaqTextIndex, FaqVectorIndex};
use crate::types::{DocMetadata, FaqDoc};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome counts of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// FAQ entries recognized in the source
    pub entries_parsed: usize,
    /// Documents written to both indexes
    pub docs_indexed: usize,
    /// Entries split because their answer exceeded the chunk window
    pub entries_chunked: usize,
}

/// Writes parsed FAQ entries into the sparse and dense indexes
pub struct FaqIngestor {
    text_index: Arc<FaqTextIndex>,
    vector_index: Arc<FaqVectorIndex>,
    encoder: Arc<dyn QueryEncoder>,
    config: IngestConfig,
    metrics: Arc<ServiceMetrics>,
}

impl FaqIngestor {
    pub fn new(
        text_index: Arc<FaqTextIndex>,
        vector_index: Arc<FaqVectorIndex>,
        encoder: Arc<dyn QueryEncoder>,
        config: IngestConfig,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            text_index,
            vector_index,
            encoder,
            config,
            metrics,
        }
    }

    /// Ingest a FAQ file from disk
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestStats> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read FAQ file '{}'", path.display()))?;
        self.ingest_content(&content).await
    }

    /// Parse, encode and index FAQ content
    pub async fn ingest_content(&self, content: &str) -> Result<IngestStats> {
        let entries = parse_faq(content);
        if entries.is_empty() {
            info!("No FAQ entries found in input");
            return Ok(IngestStats::default());
        }

        let (docs, entries_chunked) = self.to_docs(&entries)?;

        let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
        let embeddings = self
            .encoder
            .encode_batch(&texts)
            .await
            .context("Failed to encode FAQ documents")?;
        if embeddings.len() != docs.len() {
            anyhow::bail!(
                "Encoder returned {} embeddings for {} documents",
                embeddings.len(),
                docs.len()
            );
        }

        for (doc, embedding) in docs.iter().zip(embeddings) {
            self.text_index.add(doc)?;
            self.vector_index.add(doc, embedding)?;
        }
        self.text_index.commit()?;

        self.metrics.docs_indexed_total.add(docs.len() as u64);
        self.metrics.commits_total.inc();
        self.metrics.indexed_docs.set(self.text_index.num_docs());

        info!(
            "Ingested {} FAQ entries as {} documents ({} required chunking)",
            entries.len(),
            docs.len(),
            entries_chunked
        );

        Ok(IngestStats {
            entries_parsed: entries.len(),
            docs_indexed: docs.len(),
            entries_chunked,
        })
    }

    /// Convert parsed entries into indexable documents, splitting answers
    /// that exceed the chunk window
    fn to_docs(&self, entries: &[FaqEntry]) -> Result<(Vec<FaqDoc>, usize)> {
        let mut docs = Vec::with_capacity(entries.len());
        let mut entries_chunked = 0;

        for (i, entry) in entries.iter().enumerate() {
            if word_count(&entry.answer) > self.config.chunk_size {
                let cleaned = clean_markdown(&entry.answer);
                let parts =
                    fixed_chunk(&cleaned, self.config.chunk_size, self.config.chunk_overlap)?;
                debug!(
                    "Splitting long answer for '{}' into {} parts",
                    entry.question,
                    parts.len()
                );
                entries_chunked += 1;
                for (j, part) in parts.iter().enumerate() {
                    docs.push(self.make_doc(format!("faq_{}_{}", i, j), entry, part));
                }
            } else {
                docs.push(self.make_doc(format!("faq_{}", i), entry, &entry.answer));
            }
        }

        Ok((docs, entries_chunked))
    }

    fn make_doc(&self, id: String, entry: &FaqEntry, answer: &str) -> FaqDoc {
        let metadata = DocMetadata {
            question: Some(entry.question.clone()),
            answer: Some(answer.to_string()),
            section: entry.section.clone(),
            lang: self.config.lang.clone(),
            ..Default::default()
        };
        FaqDoc::new(id, format!("Q: {}\nA: {}", entry.question, answer)).with_metadata(metadata)
    }
}
