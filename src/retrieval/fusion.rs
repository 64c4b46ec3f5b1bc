//! Score fusion
//!
//! Combines sparse (BM25) and dense (vector) result lists into one ranking.
//! Each list is normalized by its own maximum score, then combined as
//! `(1 - alpha) * sparse + alpha * dense` over the union of document IDs.
//! Normalizing per backend makes the two score scales comparable without
//! calibrating BM25 weights against cosine similarities.

use crate::types::{DocId, RawHit, RetrievedDoc};
use std::collections::HashMap;

/// Score fusion parameters
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// Dense weight: 0.0 = sparse only, 1.0 = dense only
    pub alpha: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self { alpha: 0.5 }
    }
}

/// Normalize a result list by its maximum score.
///
/// An empty list yields an empty map; a list whose best score is 0 carries no
/// ranking signal and contributes 0 for every ID. Backend scores are
/// non-negative by contract, so dividing by the max lands in [0, 1].
fn normalize_by_max(hits: &[RawHit]) -> HashMap<DocId, f32> {
    let max = hits.iter().map(|h| h.score).fold(0.0f32, f32::max);
    let mut normalized = HashMap::with_capacity(hits.len());
    for hit in hits {
        let value = if max > 0.0 { hit.score / max } else { 0.0 };
        normalized.entry(hit.id.clone()).or_insert(value);
    }
    normalized
}

/// Fuse two backend result lists into a single ranking.
///
/// The output contains every ID from either input exactly once, sorted by
/// fused score descending. Ties keep insertion order: sparse hits in their
/// backend order, then dense-only hits in theirs. When both backends return
/// the same ID, the sparse copy of text and metadata wins.
pub fn fuse(sparse: &[RawHit], dense: &[RawHit], config: &FusionConfig) -> Vec<RetrievedDoc> {
    let sparse_norm = normalize_by_max(sparse);
    let dense_norm = normalize_by_max(dense);
    let alpha = config.alpha;

    let mut fused: Vec<RetrievedDoc> = Vec::with_capacity(sparse.len() + dense.len());
    let mut position: HashMap<&str, usize> = HashMap::with_capacity(sparse.len() + dense.len());

    for hit in sparse {
        if position.contains_key(hit.id.as_str()) {
            continue;
        }
        position.insert(hit.id.as_str(), fused.len());
        fused.push(RetrievedDoc {
            id: hit.id.clone(),
            text: hit.text.clone(),
            metadata: hit.metadata.clone(),
            score: 0.0,
            sparse_score: sparse_norm.get(&hit.id).copied(),
            dense_score: None,
            matched_by: vec!["sparse".to_string()],
        });
    }

    for hit in dense {
        let dense_score = dense_norm.get(&hit.id).copied();
        if let Some(&idx) = position.get(hit.id.as_str()) {
            let doc = &mut fused[idx];
            if doc.dense_score.is_none() {
                doc.dense_score = dense_score;
                doc.matched_by.push("dense".to_string());
            }
        } else {
            position.insert(hit.id.as_str(), fused.len());
            fused.push(RetrievedDoc {
                id: hit.id.clone(),
                text: hit.text.clone(),
                metadata: hit.metadata.clone(),
                score: 0.0,
                sparse_score: None,
                dense_score,
                matched_by: vec!["dense".to_string()],
            });
        }
    }

    for doc in &mut fused {
        let s = doc.sparse_score.unwrap_or(0.0);
        let d = doc.dense_score.unwrap_or(0.0);
        doc.score = (1.0 - alpha) * s + alpha * d;
    }

    // Stable sort; equal scores keep insertion order
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));

    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocMetadata;

    fn hit(id: &str, score: f32) -> RawHit {
        RawHit {
            id: id.to_string(),
            text: format!("text for {}", id),
            metadata: DocMetadata::default(),
            score,
        }
    }

    fn approx(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-6, "expected {} ~ {}", b, a);
    }

    #[test]
    fn test_fuse_worked_example() {
        // sparse A=10, B=5 normalize to A=1.0, B=0.5
        // dense B=0.9, C=0.3 normalize to B=1.0, C=1/3
        // alpha 0.5: A=0.5, B=0.75, C=1/6
        let sparse = vec![hit("A", 10.0), hit("B", 5.0)];
        let dense = vec![hit("B", 0.9), hit("C", 0.3)];
        let fused = fuse(&sparse, &dense, &FusionConfig { alpha: 0.5 });

        let ids: Vec<&str> = fused.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);

        approx(fused[0].score, 0.75);
        approx(fused[1].score, 0.5);
        approx(fused[2].score, 1.0 / 6.0);

        // Truncating to k=2 keeps B, A
        let top2: Vec<&str> = fused.iter().take(2).map(|d| d.id.as_str()).collect();
        assert_eq!(top2, vec!["B", "A"]);
    }

    #[test]
    fn test_fuse_is_deterministic() {
        let sparse = vec![hit("A", 3.0), hit("B", 2.0), hit("C", 1.0)];
        let dense = vec![hit("C", 0.8), hit("D", 0.6), hit("A", 0.4)];
        let config = FusionConfig { alpha: 0.4 };

        let first = fuse(&sparse, &dense, &config);
        let second = fuse(&sparse, &dense, &config);

        let first_ids: Vec<&str> = first.iter().map(|d| d.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.score, b.score);
        }
    }

    #[test]
    fn test_fuse_top_normalized_score_is_one() {
        let sparse = vec![hit("A", 7.3), hit("B", 2.1)];
        let dense = vec![hit("C", 0.62), hit("D", 0.31)];
        let fused = fuse(&sparse, &dense, &FusionConfig { alpha: 0.5 });

        let a = fused.iter().find(|d| d.id == "A").unwrap();
        approx(a.sparse_score.unwrap(), 1.0);
        let c = fused.iter().find(|d| d.id == "C").unwrap();
        approx(c.dense_score.unwrap(), 1.0);
    }

    #[test]
    fn test_fuse_preserves_union() {
        let sparse = vec![hit("A", 2.0), hit("B", 1.0)];
        let dense = vec![hit("B", 0.9), hit("C", 0.5), hit("D", 0.1)];
        let fused = fuse(&sparse, &dense, &FusionConfig::default());

        assert_eq!(fused.len(), 4);
        let mut ids: Vec<&str> = fused.iter().map(|d| d.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_fuse_sparse_metadata_wins_on_collision() {
        let mut sparse_hit = hit("A", 5.0);
        sparse_hit.text = "sparse copy".to_string();
        sparse_hit.metadata.question = Some("sparse question".to_string());

        let mut dense_hit = hit("A", 0.9);
        dense_hit.text = "dense copy".to_string();
        dense_hit.metadata.question = Some("dense question".to_string());

        let fused = fuse(&[sparse_hit], &[dense_hit], &FusionConfig::default());
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].text, "sparse copy");
        assert_eq!(fused[0].metadata.question, Some("sparse question".to_string()));
        assert_eq!(fused[0].matched_by, vec!["sparse", "dense"]);
    }

    #[test]
    fn test_fuse_alpha_extremes() {
        let sparse = vec![hit("A", 10.0), hit("B", 5.0)];
        let dense = vec![hit("B", 0.9), hit("C", 0.3)];

        // alpha 0: pure sparse ordering, dense-only docs score 0
        let fused = fuse(&sparse, &dense, &FusionConfig { alpha: 0.0 });
        assert_eq!(fused[0].id, "A");
        assert_eq!(fused[1].id, "B");
        approx(fused.iter().find(|d| d.id == "C").unwrap().score, 0.0);

        // alpha 1: pure dense ordering
        let fused = fuse(&sparse, &dense, &FusionConfig { alpha: 1.0 });
        assert_eq!(fused[0].id, "B");
        assert_eq!(fused[1].id, "C");
        approx(fused.iter().find(|d| d.id == "A").unwrap().score, 0.0);
    }

    #[test]
    fn test_fuse_alpha_monotonicity_for_dense_only_doc() {
        let sparse = vec![hit("A", 10.0)];
        let dense = vec![hit("C", 0.3)];

        let mut prev = -1.0f32;
        for alpha in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let fused = fuse(&sparse, &dense, &FusionConfig { alpha });
            let c_score = fused.iter().find(|d| d.id == "C").unwrap().score;
            assert!(
                c_score >= prev,
                "dense-only score should not decrease as alpha rises"
            );
            prev = c_score;
        }
    }

    #[test]
    fn test_fuse_empty_inputs() {
        let dense = vec![hit("A", 0.9), hit("B", 0.5)];
        let fused = fuse(&[], &dense, &FusionConfig { alpha: 0.5 });
        let ids: Vec<&str> = fused.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        approx(fused[0].score, 0.5);

        assert!(fuse(&[], &[], &FusionConfig::default()).is_empty());
    }

    #[test]
    fn test_fuse_tie_keeps_sparse_first() {
        // X and Y both fuse to 0.5; X was inserted first (sparse side)
        let sparse = vec![hit("X", 10.0)];
        let dense = vec![hit("Y", 0.9)];
        let fused = fuse(&sparse, &dense, &FusionConfig { alpha: 0.5 });
        approx(fused[0].score, 0.5);
        approx(fused[1].score, 0.5);
        assert_eq!(fused[0].id, "X");
        assert_eq!(fused[1].id, "Y");
    }

    #[test]
    fn test_fuse_all_zero_scores_produce_no_nan() {
        let sparse = vec![hit("A", 0.0), hit("B", 0.0)];
        let dense = vec![hit("C", 0.0)];
        let fused = fuse(&sparse, &dense, &FusionConfig::default());
        assert_eq!(fused.len(), 3);
        for doc in &fused {
            assert!(doc.score.is_finite());
            assert_eq!(doc.score, 0.0);
        }
    }
}
