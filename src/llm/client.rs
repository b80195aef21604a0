//! Ollama API client
//!
//! Provides the two remote calls the pipeline consumes:
//! - Endpoint: POST /api/generate (non-streaming completion)
//! - Endpoint: POST /api/embeddings (query embedding)
//!
//! An optional bearer token is sent for deployments behind an
//! authenticating proxy.

use crate::config::LlmConfig;
use crate::llm::{is_safety_message, Embedder, LanguageModel, LlmError};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default completion model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

/// Default embedding model (384-dim, same family as the corpus build)
pub const DEFAULT_EMBEDDING_MODEL: &str = "bge-small-en-v1.5";

/// Transport-level timeout; stage deadlines are enforced separately
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Ollama completion + embedding client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    embedding_model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: Option<String>,
}

impl OllamaClient {
    /// Create client with default settings
    pub fn new() -> Result<Self, LlmError> {
        Self::with_config(&LlmConfig::default())
    }

    /// Create client from the `[llm]` configuration section
    pub fn with_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    /// Check if Ollama is reachable
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/version", self.base_url);
        match self.client.get(&url).timeout(Duration::from_secs(2)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Get completion model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get embedding model name
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout {
                    duration_ms: REQUEST_TIMEOUT.as_millis() as u64,
                }
            } else {
                LlmError::Transport(format!("Failed to send request: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ErrorBody>(&error_text)
                .map(|b| b.error)
                .unwrap_or(error_text);
            return Err(LlmError::from_status(status.as_u16(), &message));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let response: GenerateResponse = self.post_json("/api/generate", &request).await?;

        if let Some(reason) = response.done_reason.as_deref() {
            if is_safety_message(&reason.to_lowercase()) {
                return Err(LlmError::ContentBlocked(reason.to_string()));
            }
        }

        Ok(response.response)
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let request = EmbeddingsRequest {
            model: &self.embedding_model,
            prompt: text,
        };

        let response: EmbeddingsResponse = self.post_json("/api/embeddings", &request).await?;
        if response.embedding.is_empty() {
            return Err(LlmError::MalformedResponse(
                "embedding endpoint returned an empty vector".to_string(),
            ));
        }
        Ok(response.embedding)
    }
}

/// Ollama generate request
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama generate response (non-streaming)
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}
