//! In-process dense vector index
//!
//! Exact cosine search over the FAQ corpus. At FAQ scale a brute-force scan
//! outperforms maintaining an ANN structure; the `DenseSearcher` seam is
//! where a dedicated vector store would plug in if the corpus outgrew this.

use crate::retrieval::backend::{BackendResult, DenseSearcher, SearchError};
use crate::types::{DocId, DocMetadata, Embedding, FaqDoc, QueryFilters, RawHit};
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    id: DocId,
    text: String,
    metadata: DocMetadata,
    embedding: Embedding,
}

/// On-disk snapshot format
#[derive(Serialize, Deserialize)]
struct Snapshot {
    dimensions: usize,
    entries: Vec<VectorEntry>,
}

/// Brute-force cosine index over FAQ documents
#[derive(Debug)]
pub struct FaqVectorIndex {
    dimensions: usize,
    entries: RwLock<Vec<VectorEntry>>,
}

impl FaqVectorIndex {
    /// Create an empty index for the given embedding dimensions
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Add a document with its embedding; replaces any entry with the same ID
    pub fn add(&self, doc: &FaqDoc, embedding: Embedding) -> BackendResult<()> {
        if embedding.len() != self.dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }

        let entry = VectorEntry {
            id: doc.id.clone(),
            text: doc.text.clone(),
            metadata: doc.metadata.clone(),
            embedding,
        };

        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(())
    }

    /// Remove a document by ID; returns whether it existed
    pub fn remove(&self, id: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() < before
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn search_vec(
        &self,
        vector: &[f32],
        k: usize,
        filters: Option<&QueryFilters>,
    ) -> BackendResult<Vec<RawHit>> {
        if vector.len() != self.dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let entries = self.entries.read();
        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .filter(|e| match filters {
                Some(f) => f.is_empty() || f.matches(&e.id, &e.metadata),
                None => true,
            })
            // Backend scores are non-negative by contract; negative cosine
            // carries no retrieval signal here
            .map(|e| (cosine_similarity(vector, &e.embedding).max(0.0), e))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);

        let results: Vec<RawHit> = scored
            .into_iter()
            .map(|(score, entry)| RawHit {
                id: entry.id.clone(),
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                score,
            })
            .collect();

        debug!("Dense search: {} results", results.len());
        Ok(results)
    }

    /// Write a JSON snapshot of the index
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            dimensions: self.dimensions,
            entries: self.entries.read().clone(),
        };
        let json = serde_json::to_string(&snapshot).context("Failed to serialize vector index")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write vector index to '{}'", path.display()))?;
        Ok(())
    }

    /// Load a snapshot, verifying it matches the expected dimensions
    pub fn load(path: &Path, dimensions: usize) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read vector index from '{}'", path.display()))?;
        let snapshot: Snapshot =
            serde_json::from_str(&json).context("Failed to parse vector index snapshot")?;
        if snapshot.dimensions != dimensions {
            anyhow::bail!(
                "Vector index snapshot has {} dimensions but the encoder produces {}; re-ingest the corpus",
                snapshot.dimensions,
                dimensions
            );
        }
        Ok(Self {
            dimensions,
            entries: RwLock::new(snapshot.entries),
        })
    }

    /// Load a snapshot if one exists at `path`, otherwise start empty
    pub fn load_or_new(path: &Path, dimensions: usize) -> Result<Self> {
        if path.exists() {
            Self::load(path, dimensions)
        } else {
            Ok(Self::new(dimensions))
        }
    }
}

#[async_trait]
impl DenseSearcher for FaqVectorIndex {
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filters: Option<&QueryFilters>,
    ) -> BackendResult<Vec<RawHit>> {
        self.search_vec(vector, k, filters)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "dense"
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}
