//! Answer generation through the OpenAI chat completions API.
//!
//! [`create_generation_provider`] returns `None` when generation is
//! disabled or `OPENAI_API_KEY` is unset; the query workflow then answers
//! extractively. Generation calls are never retried: a slow or failing
//! provider turns into an extractive answer for that query.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use code_harness_core::error::{RetrievalError, RetrievalResult};
use code_harness_core::generation::GenerationProvider;

use crate::config::GenerationConfig;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str =
    "You answer questions about a structured code corpus. Cite section numbers and do not invent provisions.";

/// Instantiate the configured generation provider, if any.
pub fn create_generation_provider(
    config: &GenerationConfig,
) -> RetrievalResult<Option<Arc<dyn GenerationProvider>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.is_empty() => Ok(Some(Arc::new(OpenAIChatProvider::new(config, key)?))),
            _ => {
                warn!("OPENAI_API_KEY is not set; answers will be extractive");
                Ok(None)
            }
        },
        other => Err(RetrievalError::provider(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

/// Chat completion provider for OpenAI models.
pub struct OpenAIChatProvider {
    model: String,
    temperature: f32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIChatProvider {
    pub fn new(config: &GenerationConfig, api_key: String) -> RetrievalResult<Self> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            RetrievalError::provider(format!("failed to build HTTP client: {}", e))
        })?;
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
            client,
        })
    }

    async fn complete(&self, prompt: &str) -> RetrievalResult<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .client
            .post(OPENAI_CHAT_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::provider(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::provider(format!(
                "OpenAI API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RetrievalError::provider(format!("OpenAI response was not JSON: {}", e)))?;
        parse_chat_response(&json)
    }
}

#[async_trait]
impl GenerationProvider for OpenAIChatProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, timeout: Duration) -> RetrievalResult<String> {
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, self.complete(prompt)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(model = %self.model, elapsed_ms, "chat completion finished");
        match result {
            Ok(answer) => answer,
            Err(_) => Err(RetrievalError::Timeout { elapsed_ms }),
        }
    }
}

/// Extract `choices[0].message.content`.
fn parse_chat_response(json: &serde_json::Value) -> RetrievalResult<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(str::to_string)
        .ok_or_else(|| RetrievalError::provider("invalid OpenAI response: missing message content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Section 101 applies." } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "Section 101 applies.");
        assert!(parse_chat_response(&serde_json::json!({ "choices": [] })).is_err());
    }

    #[test]
    fn test_disabled_generation_is_none() {
        assert!(create_generation_provider(&GenerationConfig::default())
            .unwrap()
            .is_none());
    }
}
