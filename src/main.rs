//! Faqdex: hybrid FAQ retrieval and answering service
//!
//! Serves cached, retrieval-grounded answers over indexed FAQ files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faqdex::{
    api::ApiServer,
    cache::{ResultCache, SharedStore, SqliteStore},
    config::{Config, EncoderKind},
    embedding::{HashingEncoder, HttpEncoder, QueryEncoder},
    generate::ExtractiveGenerator,
    ingest::FaqIngestor,
    metrics::ServiceMetrics,
    pipeline::{AskRequest, RagPipeline},
    retrieval::{FaqTextIndex, FaqVectorIndex, HybridRetriever, Reranker, TermOverlapReranker},
    types::{Query, QueryFilters},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[cfg(feature = "onnx")]
use faqdex::retrieval::CrossEncoderReranker;

#[derive(Parser)]
#[command(name = "faqdex")]
#[command(about = "Hybrid FAQ retrieval and answering service")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "faqdex.toml")]
    config: PathBuf,

    /// Data directory (overrides the configured one)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Listen address override, as host:port
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Ingest a FAQ file into the index
    Ingest {
        /// Path to the FAQ file
        path: PathBuf,
    },

    /// Ask a question against the indexed FAQ
    Ask {
        /// The question
        question: String,

        /// Number of documents to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Restrict retrieval to one language
        #[arg(long)]
        lang: Option<String>,

        /// Restrict retrieval to one FAQ section
        #[arg(long)]
        section: Option<String>,

        /// Bypass the result cache
        #[arg(long)]
        no_cache: bool,

        /// Output as "text" or "json"
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Search the index without generating an answer
    Search {
        /// Query text
        query: String,

        /// Result count
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Restrict to one language
        #[arg(long)]
        lang: Option<String>,

        /// Restrict to one FAQ section
        #[arg(long)]
        section: Option<String>,

        /// Output as "text" or "json"
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print index and cache statistics
    Stats,

    /// Write a starter faqdex.toml and create the data directory
    Init {
        /// Directory receiving the config file
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = [Level::INFO, Level::DEBUG, Level::TRACE][cli.verbose.min(2) as usize];
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli.config, cli.data_dir)?;
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Cannot create data directory '{}'",
            config.server.data_dir.display()
        )
    })?;

    match cli.command {
        Commands::Serve { listen } => run_server(config, listen).await,
        Commands::Ingest { path } => ingest_faq(config, path).await,
        Commands::Ask {
            question,
            top_k,
            lang,
            section,
            no_cache,
            format,
        } => ask_question(config, question, top_k, lang, section, no_cache, format).await,
        Commands::Search {
            query,
            top_k,
            lang,
            section,
            format,
        } => search_index(config, query, top_k, lang, section, format).await,
        Commands::Stats => show_stats(config).await,
        Commands::Init { path } => init_config(path).await,
    }
}

fn load_config(path: &Path, data_dir: Option<PathBuf>) -> Result<Config> {
    if path.exists() {
        Config::load_with_data_dir(path, data_dir)
    } else {
        let mut config = Config::default();
        if let Some(dir) = data_dir {
            config.server.data_dir = dir;
        }
        config.resolve_paths();
        Ok(config)
    }
}

// ============================================================================
// Component wiring
// ============================================================================

struct Components {
    pipeline: Arc<RagPipeline>,
    metrics: Arc<ServiceMetrics>,
    reranker: Option<Arc<dyn Reranker>>,
}

fn build_components(config: &Config) -> Result<Components> {
    let metrics = ServiceMetrics::shared();
    let encoder = build_encoder(config)?;

    let text_index = Arc::new(FaqTextIndex::new(config.server.data_dir.join("index"))?);
    let vector_index = Arc::new(FaqVectorIndex::load_or_new(
        &config.server.data_dir.join("vectors.json"),
        config.embedding.dimensions,
    )?);
    metrics.indexed_docs.set(text_index.num_docs());

    let reranker = build_reranker(config);
    let retriever = Arc::new(HybridRetriever::new(
        text_index,
        vector_index,
        encoder,
        reranker.clone(),
        config.retrieval.clone(),
        metrics.clone(),
    ));

    let generator = Arc::new(ExtractiveGenerator::new(config.generation.clone()));

    let cache = if config.cache.enabled {
        let shared = build_shared_store(config);
        Some(Arc::new(ResultCache::new(
            &config.cache,
            shared,
            metrics.clone(),
        )))
    } else {
        None
    };

    let pipeline = Arc::new(RagPipeline::new(
        retriever,
        generator,
        cache,
        metrics.clone(),
    ));

    Ok(Components {
        pipeline,
        metrics,
        reranker,
    })
}

fn build_encoder(config: &Config) -> Result<Arc<dyn QueryEncoder>> {
    let encoder: Arc<dyn QueryEncoder> = match config.embedding.encoder {
        EncoderKind::Hashing => Arc::new(HashingEncoder::new(config.embedding.dimensions)),
        EncoderKind::Http => Arc::new(HttpEncoder::from_config(&config.embedding)?),
    };
    info!(
        "Query encoder: {} ({} dimensions)",
        encoder.name(),
        encoder.dimensions()
    );
    Ok(encoder)
}

fn build_reranker(config: &Config) -> Option<Arc<dyn Reranker>> {
    if !config.retrieval.enable_reranking {
        return None;
    }

    #[cfg(feature = "onnx")]
    {
        if config.reranker.model_path.is_some() {
            match CrossEncoderReranker::from_config(&config.reranker) {
                Ok(reranker) => return Some(Arc::new(reranker)),
                Err(err) => {
                    warn!(
                        "Cross-encoder unavailable ({}), falling back to term overlap",
                        err
                    );
                }
            }
        }
    }
    #[cfg(not(feature = "onnx"))]
    {
        if config.reranker.model_path.is_some() {
            warn!("reranker.model_path is set but this build has no onnx support; using term overlap");
        }
    }

    Some(Arc::new(TermOverlapReranker))
}

fn build_shared_store(config: &Config) -> Option<Arc<dyn SharedStore>> {
    if !config.cache.shared_enabled {
        return None;
    }
    match SqliteStore::open(&config.cache.shared_db) {
        Ok(store) => Some(Arc::new(store)),
        Err(err) => {
            warn!(
                "Shared cache store unavailable ({}), continuing with the memory tier only",
                err
            );
            None
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run_server(mut config: Config, listen: Option<String>) -> Result<()> {
    if let Some(addr) = listen {
        config.server.listen_addr = addr;
    }

    info!("Starting faqdex...");
    info!("Data directory: {}", config.server.data_dir.display());

    let components = build_components(&config)?;

    // Pre-warm the reranker so the first request doesn't pay the model load
    if config.reranker.warm_on_startup {
        if let Some(reranker) = components.reranker.clone() {
            let warmed = tokio::task::spawn_blocking(move || reranker.ensure_loaded()).await?;
            if let Err(err) = warmed {
                warn!("Reranker pre-warm failed ({}); it will retry on first use", err);
            }
        }
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let server = ApiServer::new(
        config.server.clone(),
        components.pipeline.clone(),
        components.metrics.clone(),
    );
    let server_handle = tokio::spawn(async move {
        match server.run(shutdown_rx).await {
            Ok(()) => info!("HTTP serving ended cleanly"),
            Err(err) => error!("HTTP serving failed: {}", err),
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received; stopping");
        }
        _ = wait_for_sigterm() => {
            info!("SIGTERM received; stopping");
        }
    }

    let _ = shutdown_tx.send(());

    let abort = server_handle.abort_handle();
    if tokio::time::timeout(Duration::from_secs(5), server_handle)
        .await
        .is_err()
    {
        warn!("HTTP task still running 5s after shutdown; aborting it");
        abort.abort();
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(err) => {
            warn!("Failed to register SIGTERM handler: {}", err);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    // Ctrl+C still works on non-Unix platforms
    std::future::pending::<()>().await
}

async fn ingest_faq(config: Config, path: PathBuf) -> Result<()> {
    let metrics = ServiceMetrics::shared();
    let encoder = build_encoder(&config)?;

    let text_index = Arc::new(FaqTextIndex::new(config.server.data_dir.join("index"))?);
    let vectors_path = config.server.data_dir.join("vectors.json");
    let vector_index = Arc::new(FaqVectorIndex::load_or_new(
        &vectors_path,
        config.embedding.dimensions,
    )?);

    let ingestor = FaqIngestor::new(
        text_index.clone(),
        vector_index.clone(),
        encoder,
        config.ingest.clone(),
        metrics,
    );

    let stats = ingestor.ingest_file(&path).await?;
    vector_index.save(&vectors_path)?;

    println!(
        "Ingested {} FAQ entries as {} documents ({} required chunking)",
        stats.entries_parsed, stats.docs_indexed, stats.entries_chunked
    );
    println!("Index now holds {} documents", text_index.num_docs());

    Ok(())
}

async fn ask_question(
    config: Config,
    question: String,
    top_k: Option<usize>,
    lang: Option<String>,
    section: Option<String>,
    no_cache: bool,
    format: String,
) -> Result<()> {
    let components = build_components(&config)?;

    let request = AskRequest {
        question,
        top_k,
        lang,
        section,
        no_cache,
    };
    let outcome = components.pipeline.ask(&request).await?;

    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&outcome.answer)?);
        }
        _ => {
            println!("\n{}", outcome.answer.answer);
            if !outcome.answer.sources.is_empty() {
                println!("\nSources:");
                for source in &outcome.answer.sources {
                    match &source.question {
                        Some(question) => {
                            println!("  - {} ({}) [score {:.3}]", question, source.id, source.score)
                        }
                        None => println!("  - {} [score {:.3}]", source.id, source.score),
                    }
                }
            }
            println!(
                "\nConfidence: {:.2}  Cache: {}  Time: {}ms",
                outcome.answer.confidence,
                outcome.cache_status.as_str(),
                outcome.query_time_ms
            );
        }
    }

    Ok(())
}

async fn search_index(
    config: Config,
    query_text: String,
    top_k: Option<usize>,
    lang: Option<String>,
    section: Option<String>,
    format: String,
) -> Result<()> {
    let components = build_components(&config)?;
    let top_k = top_k.unwrap_or(config.retrieval.top_k);

    let filters = QueryFilters {
        lang,
        section,
        ..Default::default()
    };
    let mut query = Query::new(query_text, top_k);
    if !filters.is_empty() {
        query = query.with_filters(filters);
    }

    let results = components.pipeline.search(&query).await?;

    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        _ => {
            println!("\nSearch Results ({} found):\n", results.len());
            for (i, doc) in results.iter().enumerate() {
                println!("{}. [Score: {:.4}] {}", i + 1, doc.score, doc.id);
                if let Some(question) = &doc.metadata.question {
                    println!("   Question: {}", question);
                }
                if let Some(section) = &doc.metadata.section {
                    println!("   Section: {}", section);
                }
                println!("   Matched by: {:?}", doc.matched_by);
                println!();
            }
        }
    }

    Ok(())
}

async fn show_stats(config: Config) -> Result<()> {
    let text_index = FaqTextIndex::new(config.server.data_dir.join("index"))?;
    let vectors_path = config.server.data_dir.join("vectors.json");
    let vector_index = FaqVectorIndex::load_or_new(&vectors_path, config.embedding.dimensions)?;

    println!("\nFaqdex Statistics:");
    println!("==================");
    println!("Data directory: {}", config.server.data_dir.display());
    println!("Indexed documents: {}", text_index.num_docs());
    println!("Vector entries: {}", vector_index.len());
    println!("Embedding dimensions: {}", config.embedding.dimensions);

    if vectors_path.exists() {
        let metadata = std::fs::metadata(&vectors_path)?;
        println!("Vector snapshot size: {} bytes", metadata.len());
    }

    if config.cache.enabled && config.cache.shared_enabled && config.cache.shared_db.exists() {
        let store = SqliteStore::open(&config.cache.shared_db)?;
        println!("Shared cache entries: {}", store.len()?);
    }

    Ok(())
}

async fn init_config(path: PathBuf) -> Result<()> {
    let config = Config::default();
    let config_path = path.join("faqdex.toml");

    let toml_content = format!(
        r#"# Faqdex configuration

[server]
listen_addr = "{}"
data_dir = "{}"
# Bearer tokens accepted by the API; leave empty to disable auth
# api_keys = ["change-me"]
cors_enabled = {}

[embedding]
# "hashing" needs no model or network; "http" posts to an OpenAI-compatible
# embeddings endpoint (set endpoint and model; api_key or OPENAI_API_KEY)
encoder = "hashing"
dimensions = {}
# endpoint = "https://api.openai.com/v1/embeddings"
# model = "text-embedding-3-small"

[retrieval]
# Dense weight in score fusion: 0.0 = keyword only, 1.0 = vector only
alpha = {}
top_k = {}
candidate_multiplier = {}
fail_open = {}
enable_reranking = {}

[reranker]
# Set both paths to rerank with an ONNX cross-encoder (requires the
# "onnx" build feature); otherwise a term-overlap heuristic is used
# model_path = "models/cross-encoder.onnx"
# tokenizer_path = "models/tokenizer.json"
warm_on_startup = {}
max_length = {}

[cache]
enabled = {}
namespace = "{}"
ttl_secs = {}
shared_enabled = {}
shared_db = "{}"

[generation]
max_context_chars = {}
max_sources = {}

[ingest]
lang = "{}"
chunk_size = {}
chunk_overlap = {}
"#,
        config.server.listen_addr,
        config.server.data_dir.display(),
        config.server.cors_enabled,
        config.embedding.dimensions,
        config.retrieval.alpha,
        config.retrieval.top_k,
        config.retrieval.candidate_multiplier,
        config.retrieval.fail_open,
        config.retrieval.enable_reranking,
        config.reranker.warm_on_startup,
        config.reranker.max_length,
        config.cache.enabled,
        config.cache.namespace,
        config.cache.ttl_secs,
        config.cache.shared_enabled,
        config.cache.shared_db.display(),
        config.generation.max_context_chars,
        config.generation.max_sources,
        config.ingest.lang,
        config.ingest.chunk_size,
        config.ingest.chunk_overlap,
    );

    std::fs::write(&config_path, toml_content)?;
    println!("Created configuration file: {}", config_path.display());

    let data_dir = path.join(&config.server.data_dir);
    std::fs::create_dir_all(&data_dir)?;
    println!("Created data directory: {}", data_dir.display());

    Ok(())
}
