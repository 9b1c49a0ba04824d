use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionOptions {
    pub system: Option<String>,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("language model unavailable: {0}")]
    Unavailable(String),

    #[error("language model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("language model did not answer within {0:?}")]
    Timeout(Duration),

    #[error("language model returned an unexpected body: {0}")]
    Malformed(String),
}

/// Text-completion service used as the healer's primary strategy.
///
/// Retries, if any, belong to implementations; the healer calls once.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, CompletionError>;
}

// ============================================================================
// Ollama Backend
// ============================================================================

pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5:1.5b";

pub struct OllamaBackend {
    pub endpoint: String,
    pub model: String,
    client: reqwest::Client,
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_ENDPOINT, DEFAULT_OLLAMA_MODEL)
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaBackend {
    pub fn new(endpoint: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TextCompletion for OllamaBackend {
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            system: options.system.as_deref(),
            stream: false,
            options: options
                .max_output_tokens
                .map(|num_predict| OllamaOptions { num_predict }),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;
        Ok(body.response)
    }
}

// ============================================================================
// Test doubles
// ============================================================================

/// Returns a canned response for every prompt.
pub struct MockCompletion {
    pub response: String,
}

impl MockCompletion {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl TextCompletion for MockCompletion {
    async fn complete(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        Ok(self.response.clone())
    }
}

/// Always fails, forcing callers onto their fallback path.
pub struct UnavailableCompletion;

#[async_trait]
impl TextCompletion for UnavailableCompletion {
    async fn complete(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        Err(CompletionError::Unavailable("no model configured".to_string()))
    }
}
