//! Configuration for faqdex

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the faqdex service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl Config {
    /// Read and validate a TOML config file.
    ///
    /// Relative storage paths are resolved against the data directory, so
    /// the returned config is ready to use as-is.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_data_dir(path, None)
    }

    /// Read a TOML config file, overriding the data directory.
    ///
    /// The override is applied before path resolution so relative storage
    /// paths land under the overridden directory.
    pub fn load_with_data_dir(path: &Path, data_dir: Option<PathBuf>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file '{}'", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Malformed config file '{}'", path.display()))?;
        if let Some(dir) = data_dir {
            config.server.data_dir = dir;
        }
        config.validate()?;
        config.resolve_paths();
        Ok(config)
    }

    /// Check every section and report all problems in a single error.
    pub fn validate(&self) -> Result<()> {
        let mut problems: Vec<String> = Vec::new();

        if self.server.listen_addr.is_empty() {
            problems.push("server.listen_addr must not be empty".to_string());
        } else if let Some(port) = self
            .server
            .listen_addr
            .rsplit(':')
            .next()
            .and_then(|p| p.parse::<u32>().ok())
        {
            if !(1..=65_535).contains(&port) {
                problems.push(format!(
                    "server.listen_addr port must be 1-65535, got {}",
                    port
                ));
            }
        }
        if self.server.data_dir.as_os_str().is_empty() {
            problems.push("server.data_dir must not be empty".to_string());
        }

        if !(1..=4096).contains(&self.embedding.dimensions) {
            problems.push("embedding.dimensions must be between 1 and 4096".to_string());
        }
        if self.embedding.encoder == EncoderKind::Http {
            if self.embedding.endpoint.is_none() {
                problems.push("embedding.endpoint is required when encoder = \"http\"".to_string());
            }
            if self.embedding.model.is_none() {
                problems.push("embedding.model is required when encoder = \"http\"".to_string());
            }
        }

        if !(0.0..=1.0).contains(&self.retrieval.alpha) {
            problems.push("retrieval.alpha must lie in [0.0, 1.0]".to_string());
        }
        if self.retrieval.top_k == 0 {
            problems.push("retrieval.top_k must be at least 1".to_string());
        }
        if self.retrieval.candidate_multiplier == 0 {
            problems.push("retrieval.candidate_multiplier must be at least 1".to_string());
        }

        if self.reranker.model_path.is_some() != self.reranker.tokenizer_path.is_some() {
            problems.push(
                "reranker.model_path and reranker.tokenizer_path must be set together".to_string(),
            );
        }
        if self.reranker.max_length == 0 {
            problems.push("reranker.max_length must be at least 1".to_string());
        }

        if self.cache.enabled {
            if self.cache.ttl_secs == 0 {
                problems.push("cache.ttl_secs must be at least 1".to_string());
            }
            if self.cache.namespace.is_empty() {
                problems.push("cache.namespace must not be empty".to_string());
            }
        }

        if self.generation.max_context_chars == 0 {
            problems.push("generation.max_context_chars must be at least 1".to_string());
        }
        if self.generation.max_sources == 0 {
            problems.push("generation.max_sources must be at least 1".to_string());
        }

        if self.ingest.chunk_size == 0 {
            problems.push("ingest.chunk_size must be at least 1".to_string());
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            problems.push("ingest.chunk_overlap must be smaller than ingest.chunk_size".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Invalid configuration:\n  - {}", problems.join("\n  - "));
        }
    }

    /// Resolve relative storage paths against the data directory.
    pub fn resolve_paths(&mut self) {
        if self.cache.shared_db.is_relative() {
            self.cache.shared_db = self.server.data_dir.join(&self.cache.shared_db);
        }
    }
}

// ============================================================================
// [server] section
// ============================================================================

/// Server listen, storage, and API security settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP API binds, as "host:port"
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Directory holding the text index, vector snapshot, and cache
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Bearer tokens accepted by the API; leave empty to disable auth
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// Allow cross-origin browser requests
    #[serde(default)]
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            data_dir: default_data_dir(),
            api_keys: Vec::new(),
            cors_enabled: false,
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

// ============================================================================
// [embedding] section
// ============================================================================

/// Which implementation produces query/document vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    /// Deterministic token-hashing vectors; no model, no network
    #[default]
    Hashing,
    /// OpenAI-compatible HTTP embeddings endpoint
    Http,
}

/// Query/document embedding configuration
///
/// The http encoder works with OpenAI API, Azure OpenAI, LM Studio, vLLM,
/// Ollama (OpenAI compat mode) and text-embeddings-inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Encoder selection
    #[serde(default)]
    pub encoder: EncoderKind,
    /// Width of the produced vectors
    #[serde(default = "default_embedding_dims")]
    pub dimensions: usize,
    /// Embeddings endpoint URL, e.g. "https://api.openai.com/v1/embeddings"
    #[serde(default)]
    pub endpoint: Option<String>,
    /// API key; falls back to the OPENAI_API_KEY env var when unset
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model name, e.g. "text-embedding-3-small"
    #[serde(default)]
    pub model: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Largest number of texts sent in one embeddings request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderKind::Hashing,
            dimensions: default_embedding_dims(),
            endpoint: None,
            api_key: None,
            model: None,
            timeout_secs: default_timeout_secs(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

fn default_embedding_dims() -> usize {
    384
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_batch_size() -> usize {
    100
}

// ============================================================================
// [retrieval] section
// ============================================================================

/// Hybrid retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Dense weight in score fusion: 0.0 = sparse only, 1.0 = dense only.
    /// Fixed for the lifetime of the retriever.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Default number of results returned
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Over-fetch multiplier applied per backend before fusion
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// When one backend is unavailable, continue with the other instead of
    /// failing the request
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,
    /// Enable reranking of fused results
    #[serde(default)]
    pub enable_reranking: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            top_k: default_top_k(),
            candidate_multiplier: default_candidate_multiplier(),
            fail_open: default_fail_open(),
            enable_reranking: false,
        }
    }
}

fn default_alpha() -> f32 {
    0.5
}

fn default_top_k() -> usize {
    6
}

fn default_candidate_multiplier() -> usize {
    3
}

fn default_fail_open() -> bool {
    true
}

// ============================================================================
// [reranker] section
// ============================================================================

/// Reranker configuration.
///
/// With `model_path` unset the term-overlap reranker is used; set it (plus
/// `tokenizer_path`) to score with an ONNX cross-encoder instead (requires
/// the `onnx` build feature).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Cross-encoder ONNX model path
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Tokenizer file for the cross-encoder
    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,
    /// Load the model at startup instead of on first use
    #[serde(default = "default_warm_on_startup")]
    pub warm_on_startup: bool,
    /// Maximum token sequence length for cross-encoder input
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            tokenizer_path: None,
            warm_on_startup: default_warm_on_startup(),
            max_length: default_max_length(),
        }
    }
}

fn default_max_length() -> usize {
    512
}

fn default_warm_on_startup() -> bool {
    true
}

// ============================================================================
// [cache] section
// ============================================================================

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the result cache
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Namespace prefix applied to every cache key
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Entry time-to-live in seconds, applied uniformly to both tiers
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Enable the shared (SQLite) tier; without it the cache is
    /// process-local only
    #[serde(default = "default_cache_enabled")]
    pub shared_enabled: bool,
    /// Shared store database path (resolved under data_dir when relative)
    #[serde(default = "default_shared_db")]
    pub shared_db: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: default_namespace(),
            ttl_secs: default_ttl_secs(),
            shared_enabled: true,
            shared_db: default_shared_db(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_namespace() -> String {
    "faq:resp:".to_string()
}

fn default_ttl_secs() -> u64 {
    86_400
}

fn default_shared_db() -> PathBuf {
    PathBuf::from("cache.db")
}

// ============================================================================
// [generation] section
// ============================================================================

/// Answer generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum characters of retrieved context used when composing an answer
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Maximum sources cited per answer
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_context_chars: default_max_context_chars(),
            max_sources: default_max_sources(),
        }
    }
}

fn default_max_context_chars() -> usize {
    6000
}

fn default_max_sources() -> usize {
    3
}

// ============================================================================
// [ingest] section
// ============================================================================

/// FAQ ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Language tag stamped on ingested entries
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Word-window size used to chunk oversized answers
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Word overlap between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_overlap() -> usize {
    100
}
