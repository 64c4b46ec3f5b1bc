//! HTTP API
//!
//! REST endpoints for question answering, raw search, health and metrics,
//! mounted under `/v1`.

pub mod auth;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

pub use server::ApiServer;
