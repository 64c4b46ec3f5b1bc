//! HTTP API route definitions

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use super::auth::{require_api_key, ApiKeys};
use super::handlers::{self, ApiContext};

/// Create the API router with all routes mounted under `/v1`
///
/// Health stays outside the auth layer so probes work without credentials;
/// everything else requires a key when keys are configured.
pub fn create_router(ctx: ApiContext, api_keys: ApiKeys) -> Router {
    let public = Router::new().route("/health", get(handlers::health));

    let protected = Router::new()
        .route("/ask", post(handlers::ask))
        .route("/search", post(handlers::search))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn_with_state(api_keys, require_api_key));

    let api_v1 = public
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            handlers::track_requests,
        ))
        .with_state(ctx);

    Router::new().nest("/v1", api_v1)
}
