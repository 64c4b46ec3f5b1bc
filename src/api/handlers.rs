//! HTTP API request handlers
//!
//! Thin mappings from HTTP requests to pipeline operations.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use crate::metrics::{ServiceMetrics, Timer};
use crate::pipeline::{self, RagPipeline};
use crate::types::{Query, QueryFilters};
use crate::util::truncate_str;

use super::types::*;

/// Prometheus text exposition content type
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Handler context: the pipeline plus shared metrics
#[derive(Clone)]
pub struct ApiContext {
    pub pipeline: Arc<RagPipeline>,
    pub metrics: Arc<ServiceMetrics>,
}

/// Counts and times every request, including rejected ones
pub async fn track_requests(
    State(ctx): State<ApiContext>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let timer = Timer::start();
    let response = next.run(request).await;
    ctx.metrics.http_requests_total.inc();
    timer.record(&ctx.metrics.http_request_latency);
    response
}

/// Liveness probe, exempt from auth
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus scrape target
pub async fn metrics(State(ctx): State<ApiContext>) -> impl IntoResponse {
    ctx.metrics.update_memory_usage();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        ctx.metrics.to_prometheus(),
    )
}

/// Answer a question through the full retrieve/generate/cache pipeline
pub async fn ask(State(ctx): State<ApiContext>, Json(request): Json<AskRequest>) -> Response {
    debug!(
        "HTTP ask request: '{}'",
        truncate_str(&request.question, 80)
    );

    let params = pipeline::AskRequest {
        question: request.question,
        top_k: request.top_k,
        lang: request.lang,
        section: request.section,
        no_cache: request.no_cache,
    };

    match ctx.pipeline.ask(&params).await {
        Ok(outcome) => (StatusCode::OK, Json(AskResponse::from(outcome))).into_response(),
        Err(err) => failure("Ask", err),
    }
}

/// Raw hybrid retrieval, without answer generation or caching
pub async fn search(State(ctx): State<ApiContext>, Json(request): Json<SearchRequest>) -> Response {
    let top_k = request.top_k.unwrap_or_else(|| ctx.pipeline.default_top_k());
    debug!(
        "HTTP search request: query='{}', top_k={}",
        truncate_str(&request.query, 80),
        top_k
    );

    let filters = QueryFilters {
        lang: request.lang,
        section: request.section,
        ..Default::default()
    };
    let mut query = Query::new(request.query, top_k);
    if !filters.is_empty() {
        query = query.with_filters(filters);
    }

    let start = Instant::now();
    match ctx.pipeline.search(&query).await {
        Ok(docs) => {
            let results: Vec<SearchHitJson> = docs.iter().map(SearchHitJson::from).collect();
            let body = SearchResponse {
                results,
                query_time_ms: start.elapsed().as_millis() as u64,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => failure("Search", err),
    }
}

fn failure(operation: &str, err: anyhow::Error) -> Response {
    error!("{} failed: {}", operation, err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::internal_error(err.to_string())),
    )
        .into_response()
}
