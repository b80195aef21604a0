// Context builder for grounded answer prompts
use serde::{Deserialize, Serialize};

use crate::rag::retrieval::ScoredCandidate;

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum tokens for retrieved context
    pub max_context_tokens: usize,
    /// Label each passage with its source and page
    pub include_metadata: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 3000,
            include_metadata: true,
        }
    }
}

/// Assembled context for prompt augmentation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    /// The formatted context text
    pub text: String,
    /// Number of passages included
    pub document_count: usize,
    /// Estimated token count
    pub estimated_tokens: usize,
    /// Chunk IDs included, in prompt order
    pub document_ids: Vec<String>,
    /// Passages left out by the token budget
    pub omitted: usize,
}

/// Context builder concatenating passages in the order given
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    /// Create new context builder with default config
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Build context from ordered candidates
    ///
    /// The first passage is always included; later passages stop at the
    /// token budget.
    pub fn build(&self, candidates: &[ScoredCandidate]) -> AssembledContext {
        let mut parts = Vec::new();
        let mut total_tokens = 0;
        let mut included_ids = Vec::new();

        for candidate in candidates {
            // Estimate tokens (rough: ~4 chars per token)
            let tokens = candidate.chunk.text.len() / 4;
            if !parts.is_empty() && total_tokens + tokens > self.config.max_context_tokens {
                break;
            }

            parts.push(self.format_passage(parts.len() + 1, candidate));
            total_tokens += tokens;
            included_ids.push(candidate.chunk.id.clone());
        }

        AssembledContext {
            text: parts.join("\n\n"),
            document_count: parts.len(),
            estimated_tokens: total_tokens,
            document_ids: included_ids,
            omitted: candidates.len() - parts.len(),
        }
    }

    fn format_passage(&self, index: usize, candidate: &ScoredCandidate) -> String {
        let chunk = &candidate.chunk;
        if !self.config.include_metadata {
            return format!("[{}] {}", index, chunk.text.trim());
        }

        match chunk.page() {
            Some(page) => format!(
                "[{}] (source: {}, page {})\n{}",
                index,
                chunk.source(),
                page,
                chunk.text.trim()
            ),
            None => format!("[{}] (source: {})\n{}", index, chunk.source(), chunk.text.trim()),
        }
    }

    /// Get current configuration
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
