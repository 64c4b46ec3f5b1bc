//! Result reranking
//!
//! Rescores fused candidates against the query. Two implementations: a
//! term-overlap heuristic that needs no model files, and a cross-encoder
//! (ms-marco-MiniLM style) behind the `onnx` feature.

use crate::types::RetrievedDoc;
use std::collections::HashSet;
use thiserror::Error;

#[cfg(feature = "onnx")]
use {
    crate::config::RerankerConfig,
    anyhow::Context,
    ort::{execution_providers::CPUExecutionProvider, session::Session, value::Tensor},
    parking_lot::{Mutex, MutexGuard},
    std::path::PathBuf,
    tracing::{debug, info},
};

/// Errors from reranking
#[derive(Debug, Error)]
pub enum RerankError {
    /// Model or tokenizer failed to load
    #[error("{0}")]
    Load(String),
    /// Scoring failed after the model loaded
    #[error("reranking failed: {0}")]
    Failed(String),
}

/// Rescores retrieved documents against the query.
///
/// Implementations start unloaded and move to loaded at most once;
/// `ensure_loaded` is idempotent and a call arriving while another is
/// loading blocks until the load finishes. `rerank` loads lazily if
/// needed, never mutates its input and returns a new list sorted by the
/// fresh scores with input order as the tie-break.
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    fn is_loaded(&self) -> bool;

    /// Load model state if not already loaded
    fn ensure_loaded(&self) -> Result<(), RerankError>;

    /// Score and reorder `docs` against `query`
    fn rerank(&self, query: &str, docs: &[RetrievedDoc])
        -> Result<Vec<RetrievedDoc>, RerankError>;
}

/// Heuristic reranker blending the fused score with query term overlap
///
/// Always available; there is no model to load.
#[derive(Debug, Default)]
pub struct TermOverlapReranker;

impl Reranker for TermOverlapReranker {
    fn name(&self) -> &str {
        "term-overlap"
    }

    fn is_loaded(&self) -> bool {
        true
    }

    fn ensure_loaded(&self) -> Result<(), RerankError> {
        Ok(())
    }

    fn rerank(
        &self,
        query: &str,
        docs: &[RetrievedDoc],
    ) -> Result<Vec<RetrievedDoc>, RerankError> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let lowered = query.to_lowercase();
        let terms: HashSet<&str> = lowered.split_whitespace().collect();
        let term_count = terms.len().max(1) as f32;

        let mut reranked: Vec<RetrievedDoc> = docs.to_vec();
        for doc in reranked.iter_mut() {
            let text = doc.text.to_lowercase();
            let matched = terms.iter().filter(|t| text.contains(*t)).count() as f32;
            // Blend the fused score with the fraction of query terms present
            doc.score = doc.score * 0.7 + (matched / term_count) * 0.3;
        }

        reranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(reranked)
    }
}

#[cfg(feature = "onnx")]
struct LoadedModel {
    session: Session,
    tokenizer: tokenizers::Tokenizer,
}

#[cfg(feature = "onnx")]
impl LoadedModel {
    /// Run the model over query/document pairs, one score per pair
    fn score_batch(&mut self, pairs: &[String], max_length: usize) -> anyhow::Result<Vec<f32>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(pairs.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        let width = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(max_length);

        let rows = pairs.len();
        let (ids, mask) = pad_to_matrix(&encodings, width);

        let outputs = self.session.run(ort::inputs![
            "input_ids" => Tensor::from_array(([rows, width], ids))?,
            "attention_mask" => Tensor::from_array(([rows, width], mask))?,
        ])?;
        let (_, value) = outputs
            .iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Model produced no output tensor"))?;
        let logits = value.try_extract_array::<f32>()?;

        // Binary-classifier heads emit two logits per row; keep the positive
        // class. Single-logit heads get sigmoid-squashed instead.
        let scores = if logits.ndim() > 1 && logits.shape()[1] > 1 {
            (0..rows).map(|row| logits[[row, 1]]).collect()
        } else {
            logits.iter().take(rows).map(|&x| sigmoid(x)).collect()
        };
        Ok(scores)
    }
}

/// Flatten tokenizer output into row-major id and mask matrices of the
/// given width, truncating long rows and zero-padding short ones
#[cfg(feature = "onnx")]
fn pad_to_matrix(encodings: &[tokenizers::Encoding], width: usize) -> (Vec<i64>, Vec<i64>) {
    let mut ids = Vec::with_capacity(encodings.len() * width);
    let mut mask = Vec::with_capacity(encodings.len() * width);
    for encoding in encodings {
        let tokens = encoding.get_ids();
        let used = tokens.len().min(width);
        ids.extend(tokens[..used].iter().map(|&t| t as i64));
        mask.extend(std::iter::repeat(1).take(used));
        ids.extend(std::iter::repeat(0).take(width - used));
        mask.extend(std::iter::repeat(0).take(width - used));
    }
    (ids, mask)
}

/// Cross-encoder reranker scoring `query [SEP] text` pairs
///
/// The model loads lazily on first use, or eagerly via `ensure_loaded`
/// when the server pre-warms it at startup.
#[cfg(feature = "onnx")]
pub struct CrossEncoderReranker {
    model_path: PathBuf,
    tokenizer_path: PathBuf,
    max_length: usize,
    model: Mutex<Option<LoadedModel>>,
}

#[cfg(feature = "onnx")]
impl CrossEncoderReranker {
    pub fn new(
        model_path: impl Into<PathBuf>,
        tokenizer_path: impl Into<PathBuf>,
        max_length: usize,
    ) -> Self {
        Self {
            model_path: model_path.into(),
            tokenizer_path: tokenizer_path.into(),
            max_length,
            model: Mutex::new(None),
        }
    }

    pub fn from_config(config: &RerankerConfig) -> Result<Self, RerankError> {
        let model_path = config
            .model_path
            .clone()
            .ok_or_else(|| RerankError::Load("reranker.model_path is not set".to_string()))?;
        let tokenizer_path = config
            .tokenizer_path
            .clone()
            .ok_or_else(|| RerankError::Load("reranker.tokenizer_path is not set".to_string()))?;
        Ok(Self::new(model_path, tokenizer_path, config.max_length))
    }

    fn load_model(&self) -> anyhow::Result<LoadedModel> {
        info!("Loading cross-encoder from {}", self.model_path.display());

        let session = Session::builder()?
            .with_execution_providers([CPUExecutionProvider::default().build()])?
            .with_intra_threads(4)?
            .commit_from_file(&self.model_path)
            .context("Cross-encoder model failed to load")?;

        let tokenizer = tokenizers::Tokenizer::from_file(&self.tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Tokenizer failed to load: {}", e))?;

        Ok(LoadedModel { session, tokenizer })
    }

    /// Lock the model slot, loading the model first if it is empty
    fn locked_model(&self) -> Result<MutexGuard<'_, Option<LoadedModel>>, RerankError> {
        let mut guard = self.model.lock();
        if guard.is_none() {
            let loaded = self
                .load_model()
                .map_err(|e| RerankError::Load(e.to_string()))?;
            *guard = Some(loaded);
        }
        Ok(guard)
    }
}

#[cfg(feature = "onnx")]
impl Reranker for CrossEncoderReranker {
    fn name(&self) -> &str {
        "cross-encoder"
    }

    fn is_loaded(&self) -> bool {
        self.model.lock().is_some()
    }

    fn ensure_loaded(&self) -> Result<(), RerankError> {
        self.locked_model().map(|_| ())
    }

    fn rerank(
        &self,
        query: &str,
        docs: &[RetrievedDoc],
    ) -> Result<Vec<RetrievedDoc>, RerankError> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let mut guard = self.locked_model()?;
        let model = guard
            .as_mut()
            .ok_or_else(|| RerankError::Load("reranker model unavailable".to_string()))?;

        debug!("Reranking {} results", docs.len());

        let pairs: Vec<String> = docs
            .iter()
            .map(|d| format!("{} [SEP] {}", query, d.text))
            .collect();

        let scores = model
            .score_batch(&pairs, self.max_length)
            .map_err(|e| RerankError::Failed(e.to_string()))?;

        let mut reranked: Vec<RetrievedDoc> = docs.to_vec();
        for (doc, score) in reranked.iter_mut().zip(scores.iter()) {
            doc.score = *score;
        }

        reranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(reranked)
    }
}

#[cfg(feature = "onnx")]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocMetadata;

    fn make_doc(id: &str, text: &str, score: f32) -> RetrievedDoc {
        RetrievedDoc {
            id: id.to_string(),
            text: text.to_string(),
            metadata: DocMetadata::default(),
            score,
            sparse_score: Some(score),
            dense_score: None,
            matched_by: vec!["sparse".to_string()],
        }
    }

    #[test]
    fn test_term_overlap_reorders_by_query_overlap() {
        let reranker = TermOverlapReranker;
        let docs = vec![
            make_doc("faq_1", "The cat sat on the mat", 0.9),
            make_doc("faq_2", "Machine learning and neural networks", 0.8),
            make_doc("faq_3", "Deep learning models for machine translation", 0.7),
        ];

        let reranked = reranker.rerank("machine learning", &docs).unwrap();

        // faq_2 has both "machine" and "learning" -> full overlap boost
        // faq_3 has both "machine" and "learning" -> full overlap boost
        // faq_1 has neither -> no overlap boost
        // faq_2 had the higher original score, so it stays ahead of faq_3
        assert_eq!(reranked[0].id, "faq_2");
        assert_eq!(reranked[1].id, "faq_3");
        assert_eq!(reranked[2].id, "faq_1");
    }

    #[test]
    fn test_term_overlap_empty_input() {
        let reranker = TermOverlapReranker;
        let reranked = reranker.rerank("some query", &[]).unwrap();
        assert!(reranked.is_empty());
    }

    #[test]
    fn test_term_overlap_exact_arithmetic() {
        let reranker = TermOverlapReranker;
        let docs = vec![make_doc("faq_1", "machine learning basics", 0.5)];

        let reranked = reranker.rerank("machine learning", &docs).unwrap();

        // 0.5 * 0.7 + 1.0 * 0.3 = 0.65 (full overlap: 2/2 terms match)
        let expected = 0.5 * 0.7 + 1.0 * 0.3;
        assert!((reranked[0].score - expected).abs() < 1e-6);
    }

    #[test]
    fn test_term_overlap_partial_overlap_scores() {
        let reranker = TermOverlapReranker;
        let docs = vec![
            make_doc("faq_1", "only machine here", 0.5),
            make_doc("faq_2", "no relevant words", 0.5),
        ];

        let reranked = reranker.rerank("machine learning", &docs).unwrap();

        // faq_1 has 1/2 terms matching -> overlap_boost = 0.5
        // faq_2 has 0/2 terms matching -> overlap_boost = 0.0
        let score_1 = 0.5 * 0.7 + 0.5 * 0.3;
        let score_2 = 0.5 * 0.7 + 0.0 * 0.3;

        assert_eq!(reranked[0].id, "faq_1");
        assert!((reranked[0].score - score_1).abs() < 1e-6);
        assert_eq!(reranked[1].id, "faq_2");
        assert!((reranked[1].score - score_2).abs() < 1e-6);
    }

    #[test]
    fn test_term_overlap_case_insensitive() {
        let reranker = TermOverlapReranker;
        let docs = vec![make_doc("faq_1", "MACHINE LEARNING models", 0.5)];

        let reranked = reranker.rerank("machine learning", &docs).unwrap();

        let expected = 0.5 * 0.7 + 1.0 * 0.3;
        assert!((reranked[0].score - expected).abs() < 1e-6);
    }

    #[test]
    fn test_rerank_does_not_mutate_input() {
        let reranker = TermOverlapReranker;
        let docs = vec![
            make_doc("faq_1", "unrelated content", 0.9),
            make_doc("faq_2", "machine learning content", 0.1),
        ];

        let reranked = reranker.rerank("machine learning", &docs).unwrap();

        assert_eq!(reranked[0].id, "faq_2");
        // Originals keep their scores and order
        assert_eq!(docs[0].score, 0.9);
        assert_eq!(docs[1].score, 0.1);
        assert_eq!(docs[0].id, "faq_1");
    }

    #[test]
    fn test_equal_scores_keep_input_order() {
        let reranker = TermOverlapReranker;
        let docs = vec![
            make_doc("faq_1", "machine learning intro", 0.5),
            make_doc("faq_2", "machine learning advanced", 0.5),
        ];

        let reranked = reranker.rerank("machine learning", &docs).unwrap();

        // Identical boosts and identical base scores: input order wins
        assert_eq!(reranked[0].id, "faq_1");
        assert_eq!(reranked[1].id, "faq_2");
    }

    #[test]
    fn test_term_overlap_lifecycle_is_trivial() {
        let reranker = TermOverlapReranker;
        assert!(reranker.is_loaded());
        reranker.ensure_loaded().unwrap();
        assert_eq!(reranker.name(), "term-overlap");
    }

    #[cfg(feature = "onnx")]
    mod cross_encoder {
        use super::*;
        use crate::config::RerankerConfig;

        #[test]
        fn test_empty_input_skips_model_load() {
            let reranker = CrossEncoderReranker::new("/nonexistent/model.onnx", "/nonexistent/tokenizer.json", 512);
            let reranked = reranker.rerank("query", &[]).unwrap();
            assert!(reranked.is_empty());
            assert!(!reranker.is_loaded());
        }

        #[test]
        fn test_from_config_requires_paths() {
            let config = RerankerConfig::default();
            let err = CrossEncoderReranker::from_config(&config).unwrap_err();
            assert!(matches!(err, RerankError::Load(_)));
        }

        #[test]
        fn test_load_failure_reported() {
            let reranker = CrossEncoderReranker::new("/nonexistent/model.onnx", "/nonexistent/tokenizer.json", 512);
            let err = reranker.ensure_loaded().unwrap_err();
            assert!(matches!(err, RerankError::Load(_)));
            assert!(!reranker.is_loaded());
        }
    }
}
