//! HTTP embedding providers and client construction.
//!
//! Implements the core [`EmbeddingProvider`] trait for:
//! - **[`OpenAIProvider`]**: `POST https://api.openai.com/v1/embeddings`.
//! - **[`OllamaProvider`]**: `POST {url}/api/embed` on a local Ollama instance.
//!
//! [`create_embedding_client`] wraps the configured provider in an
//! [`EmbeddingClient`] that builds it lazily, once, on first use. A
//! disabled provider or a missing `OPENAI_API_KEY` leaves the client on
//! the deterministic fallback embedding when `allow_fallback` is set.
//!
//! # Retry Strategy
//!
//! Both providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Every failure surfaces as [`RetrievalError::ProviderUnavailable`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use code_harness_core::embedding::{EmbeddingClient, EmbeddingProvider};
use code_harness_core::error::{RetrievalError, RetrievalResult};

use crate::config::EmbeddingConfig;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Build the [`EmbeddingClient`] described by `config`.
///
/// The provider itself is constructed on the first embed call.
pub fn create_embedding_client(config: &EmbeddingConfig) -> EmbeddingClient {
    let factory_config = config.clone();
    EmbeddingClient::new(
        Box::new(move || create_provider(&factory_config)),
        config.allow_fallback,
        config.dims,
    )
}

/// Instantiate the configured provider.
///
/// Returns `Ok(None)` when the provider is disabled or its credentials are
/// missing.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> RetrievalResult<Option<Arc<dyn EmbeddingProvider>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.is_empty() => Ok(Some(Arc::new(OpenAIProvider::new(config, key)?))),
            _ => {
                warn!("OPENAI_API_KEY is not set; embedding provider unavailable");
                Ok(None)
            }
        },
        "ollama" => Ok(Some(Arc::new(OllamaProvider::new(config)?))),
        other => Err(RetrievalError::provider(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

fn http_client(timeout_secs: u64) -> RetrievalResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RetrievalError::provider(format!("failed to build HTTP client: {}", e)))
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> RetrievalResult<Self> {
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            api_key,
            max_retries: config.max_retries,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> RetrievalResult<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let json = post_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(OPENAI_EMBEDDINGS_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
        })
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract the first `data[].embedding` array.
fn parse_openai_response(json: &serde_json::Value) -> RetrievalResult<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|data| data.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| RetrievalError::provider("invalid OpenAI response: missing embedding"))?;

    Ok(to_f32_vec(embedding))
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Requires Ollama to be running with an embedding model pulled (e.g.
/// `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> RetrievalResult<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            url: url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> RetrievalResult<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let endpoint = format!("{}/api/embed", self.url);
        let json = post_with_retry("Ollama", self.max_retries, || {
            self.client
                .post(&endpoint)
                .header("Content-Type", "application/json")
                .json(&body)
        })
        .await
        .map_err(|e| {
            RetrievalError::provider(format!("{} (is Ollama running at {}?)", e, self.url))
        })?;
        parse_ollama_response(&json)
    }
}

/// Extract the first `embeddings[]` array.
fn parse_ollama_response(json: &serde_json::Value) -> RetrievalResult<Vec<f32>> {
    let embedding = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|all| all.first())
        .and_then(|e| e.as_array())
        .ok_or_else(|| RetrievalError::provider("invalid Ollama response: missing embeddings"))?;

    Ok(to_f32_vec(embedding))
}

// ============ Shared ============

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

/// Send a JSON request, retrying 429/5xx and network errors with backoff.
pub(crate) async fn post_with_retry<F>(
    label: &str,
    max_retries: u32,
    build: F,
) -> RetrievalResult<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(attempt, delay_secs = delay.as_secs(), "{} retry", label);
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        RetrievalError::provider(format!("{} response was not JSON: {}", label, e))
                    });
                }

                // Rate limited or server error: retry
                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(format!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                // Client error (not 429): fail now
                return Err(RetrievalError::provider(format!(
                    "{} API error {}: {}",
                    label, status, body_text
                )));
            }
            Err(e) => {
                last_err = Some(format!("{} request failed: {}", label, e));
                continue;
            }
        }
    }

    Err(RetrievalError::provider(last_err.unwrap_or_else(|| {
        format!("{} request failed after retries", label)
    })))
}
