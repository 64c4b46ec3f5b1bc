//! HTTP encoder for OpenAI-compatible embedding endpoints
//!
//! Speaks the `/v1/embeddings` wire format, which covers the hosted OpenAI
//! and Azure APIs as well as self-hosted servers such as vLLM, Ollama, and
//! text-embeddings-inference.

use super::{normalize_embedding, EncoderError, EncoderResult, QueryEncoder};
use crate::config::EmbeddingConfig;
use crate::types::Embedding;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Encoder that posts text to an OpenAI-compatible embeddings API
#[derive(Debug)]
pub struct HttpEncoder {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    max_batch_size: usize,
}

/// Request body for the `/v1/embeddings` wire format
#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    /// Only models that support embedding shortening accept this field
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    data: Vec<WireEmbedding>,
}

#[derive(Debug, Deserialize)]
struct WireEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: WireErrorBody,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    message: String,
}

impl HttpEncoder {
    /// Build an encoder from the `[embedding]` config section.
    ///
    /// The API key falls back to `OPENAI_API_KEY` when the config leaves
    /// it unset.
    pub fn from_config(config: &EmbeddingConfig) -> EncoderResult<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| EncoderError::Config("embedding endpoint is not set".to_string()))?;
        let model = config
            .model
            .clone()
            .ok_or_else(|| EncoderError::Config("embedding model is not set".to_string()))?;

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        if api_key.is_none() && endpoint.contains("openai.com") {
            warn!("No API key configured for {}", endpoint);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EncoderError::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!("HTTP encoder ready: {} via {}", model, endpoint);

        Ok(Self {
            client,
            endpoint,
            api_key,
            model,
            dimensions: config.dimensions,
            max_batch_size: config.max_batch_size.max(1),
        })
    }

    async fn request_embeddings(&self, input: &[&str]) -> EncoderResult<Vec<Embedding>> {
        let body = WireRequest {
            model: &self.model,
            input,
            dimensions: self.dimension_param(),
            encoding_format: "float",
        };

        debug!("Encoding {} texts via {}", input.len(), self.endpoint);

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EncoderError::RateLimited {
                retry_after_ms: retry_after_ms(response.headers()),
            });
        }
        if !status.is_success() {
            return Err(EncoderError::Failed(api_error(status, response).await));
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| EncoderError::Failed(format!("Malformed embeddings response: {}", e)))?;

        if parsed.data.len() != input.len() {
            return Err(EncoderError::Failed(format!(
                "Requested {} embeddings but received {}",
                input.len(),
                parsed.data.len()
            )));
        }

        // The API may reorder items; `index` restores request order
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);

        Ok(data
            .into_iter()
            .map(|d| normalize_embedding(d.embedding))
            .collect())
    }

    /// The `dimensions` request field, for models that honor it
    fn dimension_param(&self) -> Option<usize> {
        if self.model.contains("text-embedding-3") {
            Some(self.dimensions)
        } else {
            None
        }
    }
}

/// Parse a Retry-After header into milliseconds
fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    let seconds: u64 = headers.get("retry-after")?.to_str().ok()?.parse().ok()?;
    Some(seconds * 1000)
}

/// Render a failed response into an error message, preferring the
/// structured API error body when one is present
async fn api_error(status: StatusCode, response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<WireError>(&text) {
        Ok(wire) => format!("API error ({}): {}", status, wire.error.message),
        Err(_) => format!("HTTP error ({}): {}", status, text),
    }
}

#[async_trait::async_trait]
impl QueryEncoder for HttpEncoder {
    async fn encode(&self, text: &str) -> EncoderResult<Embedding> {
        let mut embeddings = self.request_embeddings(&[text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| EncoderError::Failed("No embedding returned".to_string()))
    }

    async fn encode_batch(&self, texts: &[String]) -> EncoderResult<Vec<Embedding>> {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let mut out = Vec::with_capacity(texts.len());
        for window in refs.chunks(self.max_batch_size) {
            out.extend(self.request_embeddings(window).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "http"
    }
}
