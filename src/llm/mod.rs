//! Language model and embedding collaborators
//!
//! The pipeline only ever needs two remote operations: `complete(prompt)`
//! (shared by expansion, reranking and generation, each with its own prompt
//! template) and `embed(text)` for the semantic ranking. Both are traits so
//! tests and alternative providers can be substituted.

pub mod client;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{OllamaClient, DEFAULT_EMBEDDING_MODEL, DEFAULT_MODEL, DEFAULT_OLLAMA_URL};

/// Typed failure of a remote model call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// 401/403 or missing credentials
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// 429 or quota exhaustion
    #[error("rate limit reached: {0}")]
    RateLimited(String),

    /// Provider refused on content-safety grounds
    #[error("content blocked by provider: {0}")]
    ContentBlocked(String),

    #[error("request timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Connection refused, DNS failure, broken body stream
    #[error("transport error: {0}")]
    Transport(String),

    /// Any other non-success status
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    /// Classify a non-success HTTP response from a model endpoint
    pub fn from_status(status: u16, body: &str) -> Self {
        let lowered = body.to_lowercase();
        match status {
            401 | 403 => LlmError::Auth(body.to_string()),
            429 => LlmError::RateLimited(body.to_string()),
            _ if lowered.contains("quota") || lowered.contains("rate limit") => {
                LlmError::RateLimited(body.to_string())
            }
            _ if lowered.contains("api key") || lowered.contains("unauthorized") => {
                LlmError::Auth(body.to_string())
            }
            _ if is_safety_message(&lowered) => LlmError::ContentBlocked(body.to_string()),
            _ => LlmError::Api {
                status,
                message: body.to_string(),
            },
        }
    }
}

/// Heuristic match for provider content-safety refusals
pub(crate) fn is_safety_message(lowered: &str) -> bool {
    lowered.contains("safety") || lowered.contains("content blocked") || lowered.contains("blocked by")
}

/// Text completion service
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a single prompt and return the raw text
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Text embedding service
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Map text into the vector space the passage store was built with
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(LlmError::from_status(401, "bad key"), LlmError::Auth(_)));
        assert!(matches!(LlmError::from_status(403, ""), LlmError::Auth(_)));
        assert!(matches!(LlmError::from_status(429, ""), LlmError::RateLimited(_)));
        assert!(matches!(
            LlmError::from_status(400, "Quota exceeded for project"),
            LlmError::RateLimited(_)
        ));
        assert!(matches!(
            LlmError::from_status(400, "response blocked by safety filters"),
            LlmError::ContentBlocked(_)
        ));
        assert_eq!(
            LlmError::from_status(500, "boom"),
            LlmError::Api {
                status: 500,
                message: "boom".to_string()
            }
        );
    }
}
