//! Error types for the gridtutor pipeline
//!
//! Every stage failure is a distinct, caller-visible variant so the
//! surrounding application can decide how to degrade or what to show.

use std::fmt;
use thiserror::Error;

/// Classification of answer generation failures.
///
/// The UI layer renders different guidance for each of these, so they are
/// never collapsed into one generic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// Credentials missing, invalid or revoked
    AuthError,
    /// Provider quota or rate limit reached
    RateLimited,
    /// Provider refused the prompt or the answer on content-safety grounds
    ContentBlocked,
    /// Anything else (transport, timeout, malformed response, server errors)
    Other,
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GenerationErrorKind::AuthError => "authentication",
            GenerationErrorKind::RateLimited => "rate limited",
            GenerationErrorKind::ContentBlocked => "content blocked",
            GenerationErrorKind::Other => "other",
        };
        f.write_str(label)
    }
}

/// Main error type for the retrieval-and-generation pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// LLM unavailable while expanding the query (recoverable)
    #[error("Query expansion failed: {0}")]
    ExpansionFailure(String),

    /// Passage store or embedding service unavailable (fatal to the query)
    #[error("Retrieval failed: {0}")]
    RetrievalFailure(String),

    /// LLM unavailable for every rerank batch (recoverable)
    #[error("Reranking failed: {0}")]
    RerankFailure(String),

    /// Answer generation failed (fatal to the query)
    #[error("Generation failed ({kind}): {message}")]
    GenerationFailure {
        kind: GenerationErrorKind,
        message: String,
    },

    /// Pipeline stage machine was driven out of order
    #[error("Invalid stage transition from {from:?} on {event}: {reason}")]
    InvalidTransition {
        from: String,
        event: String,
        reason: String,
    },

    /// Caller supplied an unusable argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl PipelineError {
    /// Whether the orchestrator may continue with a degraded input
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::ExpansionFailure(_) | PipelineError::RerankFailure(_)
        )
    }

    /// Generation failure kind, if this is a generation failure
    pub fn generation_kind(&self) -> Option<GenerationErrorKind> {
        match self {
            PipelineError::GenerationFailure { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
