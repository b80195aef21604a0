// Hybrid retrieval engine: BM25 + vector search fused by reciprocal rank
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RetrievalConfig;
use crate::errors::{PipelineError, Result};
use crate::llm::{Embedder, LlmError};
use crate::rag::lexical::Bm25Index;
use crate::rag::retrieval::candidate::ScoredCandidate;
use crate::rag::retrieval::filter::Filter;
use crate::rag::retrieval::fusion::reciprocal_rank_fusion;
use crate::store::{Chunk, PassageStore, StoreError};
use crate::timeout::bounded;

/// Search parameters for one retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Maximum number of results to return
    pub top_k: usize,
    /// Metadata filter (None = whole corpus)
    pub filters: Option<Filter>,
    /// Fuse BM25 with the semantic ranking
    pub hybrid: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            filters: None,
            hybrid: true,
        }
    }
}

/// Retrieval engine fusing keyword and semantic rankings
pub struct RetrievalEngine {
    store: Arc<dyn PassageStore>,
    embedder: Arc<dyn Embedder>,
    lexical: Bm25Index,
    config: RetrievalConfig,
    call_timeout: Duration,
}

impl RetrievalEngine {
    /// Create the engine, building the keyword index from the store
    pub async fn new(
        store: Arc<dyn PassageStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrievalConfig,
        call_timeout: Duration,
    ) -> Result<Self> {
        config.validate()?;

        let chunks = bounded(call_timeout, store.chunks(), |ms| StoreError::Timeout {
            duration_ms: ms,
        })
        .await
        .map_err(|e| PipelineError::RetrievalFailure(format!("Failed to load corpus: {}", e)))?;

        let lexical = Bm25Index::build(chunks, config.bm25_k1, config.bm25_b);
        debug!(chunks = lexical.len(), "built keyword index");

        Ok(Self {
            store,
            embedder,
            lexical,
            config,
            call_timeout,
        })
    }

    /// Retrieve candidates for `query`, best first, at most `params.top_k`
    pub async fn retrieve(&self, query: &str, params: &SearchParams) -> Result<Vec<ScoredCandidate>> {
        if query.trim().is_empty() {
            return Err(PipelineError::InvalidInput("query must not be empty".to_string()));
        }

        let corpus_len = self.store.len();
        if params.top_k == 0 || corpus_len == 0 {
            return Ok(Vec::new());
        }

        let query_vector = bounded(self.call_timeout, self.embedder.embed(query), |ms| {
            LlmError::Timeout { duration_ms: ms }
        })
        .await
        .map_err(|e| PipelineError::RetrievalFailure(format!("Failed to embed query: {}", e)))?;

        let filter = params.filters.as_ref().filter(|f| !f.is_empty());
        let mut fetch_k = match filter {
            Some(_) => params.top_k.saturating_mul(self.config.oversample_factor.max(1)),
            None => params.top_k,
        }
        .min(corpus_len);

        loop {
            let semantic = self.semantic_ranking(&query_vector, fetch_k).await?;
            let lexical: Vec<Arc<Chunk>> = if params.hybrid {
                self.lexical
                    .rank(query, fetch_k)
                    .into_iter()
                    .map(|hit| hit.chunk)
                    .collect()
            } else {
                Vec::new()
            };

            let fused = reciprocal_rank_fusion(&lexical, &semantic, self.config.rrf_k);
            let unfiltered = fused.len();

            let mut candidates: Vec<ScoredCandidate> = match filter {
                Some(f) => fused
                    .into_iter()
                    .filter(|c| f.matches(&c.chunk.metadata))
                    .collect(),
                None => fused,
            };

            debug!(
                fetch_k,
                lexical = lexical.len(),
                semantic = semantic.len(),
                unfiltered,
                kept = candidates.len(),
                "fused rankings"
            );

            let exhausted = fetch_k >= corpus_len;
            let filled = candidates.len() >= params.top_k;
            if filter.is_none() || filled || exhausted || !self.config.adaptive_oversampling {
                candidates.truncate(params.top_k);
                return Ok(candidates);
            }

            // strictly increasing, so the loop ends at corpus_len
            fetch_k = fetch_k.saturating_mul(2).max(fetch_k + 1).min(corpus_len);
        }
    }

    /// Number of chunks in the keyword index
    pub fn indexed_chunks(&self) -> usize {
        self.lexical.len()
    }

    /// Get retrieval configuration
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    async fn semantic_ranking(&self, vector: &[f32], k: usize) -> Result<Vec<Arc<Chunk>>> {
        let hits = bounded(self.call_timeout, self.store.search_semantic(vector, k), |ms| {
            StoreError::Timeout { duration_ms: ms }
        })
        .await
        .map_err(|e| PipelineError::RetrievalFailure(format!("Vector search failed: {}", e)))?;

        Ok(hits.into_iter().map(|hit| hit.chunk).collect())
    }
}
