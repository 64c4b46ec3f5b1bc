//! HTTP serving for the faqdex REST API

use crate::config::ServerConfig;
use crate::metrics::ServiceMetrics;
use crate::pipeline::RagPipeline;
use anyhow::{Context, Result};
use axum::http::Method;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::auth::ApiKeys;
use super::handlers::ApiContext;
use super::routes::create_router;

/// Serves the REST API until told to shut down
pub struct ApiServer {
    config: ServerConfig,
    ctx: ApiContext,
}

impl ApiServer {
    pub fn new(
        config: ServerConfig,
        pipeline: Arc<RagPipeline>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            config,
            ctx: ApiContext { pipeline, metrics },
        }
    }

    /// Assemble the middleware stack around the API routes
    fn build_app(&self) -> Router {
        let keys = ApiKeys::new(self.config.api_keys.clone());
        let mut app = create_router(self.ctx.clone(), keys);
        if self.config.cors_enabled {
            app = app.layer(
                CorsLayer::new()
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers(Any)
                    .allow_origin(Any),
            );
        }
        app.layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until the shutdown channel fires
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address '{}'", self.config.listen_addr))?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;
        // local_addr resolves port 0 to the actual port
        let bound = listener.local_addr().unwrap_or(addr);
        info!("HTTP API listening on http://{}", bound);

        axum::serve(listener, self.build_app())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("HTTP API shutting down");
            })
            .await
            .context("HTTP server error")
    }
}
