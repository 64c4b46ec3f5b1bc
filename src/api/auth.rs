//! Bearer-token authentication for the HTTP API

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::types::ErrorResponse;

/// The configured API key list, shared across requests.
///
/// An empty list disables enforcement entirely.
#[derive(Clone)]
pub struct ApiKeys(Arc<Vec<String>>);

impl ApiKeys {
    pub fn new(keys: Vec<String>) -> Self {
        Self(Arc::new(keys))
    }

    pub fn is_enforced(&self) -> bool {
        !self.0.is_empty()
    }

    /// Accepts `Bearer <key>` and bare `<key>` Authorization headers
    pub fn allows(&self, authorization: Option<&str>) -> bool {
        if !self.is_enforced() {
            return true;
        }
        match authorization {
            Some(value) => {
                let presented = value.strip_prefix("Bearer ").unwrap_or(value).trim();
                self.0.iter().any(|k| k == presented)
            }
            None => false,
        }
    }
}

/// Middleware that answers 401 for requests without an accepted key
pub async fn require_api_key(
    State(keys): State<ApiKeys>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if keys.allows(authorization) {
        return next.run(request).await;
    }
    (StatusCode::UNAUTHORIZED, Json(ErrorResponse::unauthorized())).into_response()
}
