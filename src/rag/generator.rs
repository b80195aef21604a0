// Grounded answer generation with a fixed out-of-domain refusal
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PromptConfig;
use crate::errors::{GenerationErrorKind, PipelineError, Result};
use crate::llm::{LanguageModel, LlmError};
use crate::rag::context::ContextBuilder;
use crate::rag::retrieval::ScoredCandidate;
use crate::timeout::bounded;

const PREVIEW_CHARS: usize = 200;

/// Where a piece of context came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub chunk_id: String,
    /// Originating document identifier
    pub source: String,
    pub page: Option<String>,
    /// Rerank relevance if reranked, fused score otherwise
    pub relevance_score: f64,
    /// Leading characters of the chunk text
    pub preview: String,
}

impl SourceAttribution {
    fn from_candidate(candidate: &ScoredCandidate) -> Self {
        let chunk = &candidate.chunk;
        let mut preview: String = chunk.text.chars().take(PREVIEW_CHARS).collect();
        if chunk.text.chars().count() > PREVIEW_CHARS {
            preview.push_str("...");
        }
        Self {
            chunk_id: chunk.id.clone(),
            source: chunk.source().to_string(),
            page: chunk.page().map(str::to_string),
            relevance_score: candidate.relevance(),
            preview,
        }
    }
}

/// Generated answer with its attributed sources, best first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceAttribution>,
    /// Set when `text` is exactly the configured refusal sentence
    pub refused: bool,
}

impl Answer {
    fn refusal(message: &str) -> Self {
        Self {
            text: message.to_string(),
            sources: Vec::new(),
            refused: true,
        }
    }

    pub fn is_refusal(&self) -> bool {
        self.refused
    }
}

/// Map a model failure onto the caller-visible generation failure kinds
pub fn classify(error: &LlmError) -> GenerationErrorKind {
    match error {
        LlmError::Auth(_) => GenerationErrorKind::AuthError,
        LlmError::RateLimited(_) => GenerationErrorKind::RateLimited,
        LlmError::ContentBlocked(_) => GenerationErrorKind::ContentBlocked,
        LlmError::Timeout { .. }
        | LlmError::Transport(_)
        | LlmError::Api { .. }
        | LlmError::MalformedResponse(_) => GenerationErrorKind::Other,
    }
}

/// Answer generator restricted to the configured domain
pub struct AnswerGenerator {
    llm: Arc<dyn LanguageModel>,
    prompts: PromptConfig,
    context_builder: ContextBuilder,
    call_timeout: Duration,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>, prompts: PromptConfig, call_timeout: Duration) -> Self {
        Self {
            llm,
            prompts,
            context_builder: ContextBuilder::new(),
            call_timeout,
        }
    }

    /// Replace the context builder (token budget, metadata labels)
    pub fn with_context_builder(mut self, context_builder: ContextBuilder) -> Self {
        self.context_builder = context_builder;
        self
    }

    /// The sentence emitted for out-of-domain or unanswerable questions
    pub fn refusal_message(&self) -> &str {
        &self.prompts.refusal_message
    }

    /// Answer `query` from `context`, which is used in the order given
    ///
    /// With no context at all the refusal is returned without a model call.
    /// A reply that is (or contains) the refusal sentence is normalised to
    /// exactly that sentence and never carries sources.
    pub async fn generate(
        &self,
        query: &str,
        context: &[ScoredCandidate],
        with_sources: bool,
    ) -> Result<Answer> {
        if query.trim().is_empty() {
            return Err(PipelineError::InvalidInput("query must not be empty".to_string()));
        }
        if context.is_empty() {
            debug!("no context retrieved, refusing");
            return Ok(Answer::refusal(&self.prompts.refusal_message));
        }

        let assembled = self.context_builder.build(context);
        if assembled.omitted > 0 {
            debug!(
                included = assembled.document_count,
                omitted = assembled.omitted,
                budget = self.context_builder.config().max_context_tokens,
                "context budget reached, passages left out of the prompt"
            );
        }
        let prompt = self.build_prompt(query, &assembled.text);

        let reply = bounded(self.call_timeout, self.llm.complete(&prompt), |ms| {
            LlmError::Timeout { duration_ms: ms }
        })
        .await
        .map_err(|e| {
            let kind = classify(&e);
            warn!(%kind, error = %e, "answer generation failed");
            PipelineError::GenerationFailure {
                kind,
                message: e.to_string(),
            }
        })?;

        let text = reply.trim();
        if self.is_refusal_text(text) {
            debug!("model refused out-of-domain question");
            return Ok(Answer::refusal(&self.prompts.refusal_message));
        }

        let sources = if with_sources {
            let mut sources: Vec<SourceAttribution> = context
                .iter()
                .filter(|c| assembled.document_ids.contains(&c.chunk.id))
                .map(SourceAttribution::from_candidate)
                .collect();
            // Stable sort keeps context order among equal scores
            sources.sort_by(|a, b| {
                b.relevance_score
                    .partial_cmp(&a.relevance_score)
                    .unwrap_or(Ordering::Equal)
            });
            sources
        } else {
            Vec::new()
        };

        Ok(Answer {
            text: text.to_string(),
            sources,
            refused: false,
        })
    }

    fn is_refusal_text(&self, text: &str) -> bool {
        let refusal = self.prompts.refusal_message.trim();
        text == refusal || text.contains(refusal)
    }

    fn build_prompt(&self, query: &str, context: &str) -> String {
        let domain = &self.prompts.domain_description;
        format!(
            "{instruction}\n\n\
             Instructions:\n\
             1. Read the context provided below.\n\
             2. If the question is related to {domain}, answer using only the context, even if the context is partial or general.\n\
             3. For broad questions, provide what information you can find in the context.\n\
             4. Do not use knowledge that is not in the context.\n\
             5. Only if the question is completely unrelated to {domain}, respond with exactly this sentence and nothing else: \"{refusal}\"\n\n\
             Context:\n\
             {context}\n\n\
             Question: {query}\n\n\
             Answer:",
            instruction = self.prompts.domain_instruction,
            domain = domain,
            refusal = self.prompts.refusal_message,
            context = context,
            query = query,
        )
    }
}
