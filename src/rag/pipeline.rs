// End-to-end pipeline: expand -> retrieve -> rerank -> generate
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::{PipelineError, Result};
use crate::llm::{Embedder, LanguageModel};
use crate::rag::expansion::{ExpansionResult, QueryExpander};
use crate::rag::generator::{Answer, AnswerGenerator};
use crate::rag::reranking::ReRanker;
use crate::rag::retrieval::{Filter, RetrievalEngine, ScoredCandidate, SearchParams};
use crate::rag::state::{PipelineStage, StageEvent, StageTracker};
use crate::store::PassageStore;

/// Per-query options; defaults come from the `[features]` and `[retrieval]` config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOptions {
    pub filters: Option<Filter>,
    pub top_k: usize,
    pub use_expansion: bool,
    pub use_hybrid: bool,
    pub use_rerank: bool,
    pub with_sources: bool,
}

impl QueryOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            filters: None,
            top_k: config.retrieval.top_k,
            use_expansion: config.features.use_query_expansion,
            use_hybrid: config.features.use_hybrid_search,
            use_rerank: config.features.use_reranking,
            with_sources: config.features.show_sources,
        }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Outcome of one query with its trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RAGResult {
    /// Original query
    pub query: String,
    pub answer: Answer,
    /// Present when expansion ran successfully
    pub expansion: Option<ExpansionResult>,
    /// Stages visited, in order
    pub stages: Vec<PipelineStage>,
    /// Number of candidates retrieved
    pub documents_retrieved: usize,
    /// Number of candidates handed to the generator
    pub documents_reranked: usize,
    pub elapsed_ms: u64,
}

/// Generator input with the counts reported in `RAGResult`
struct PreparedContext {
    expansion: Option<ExpansionResult>,
    documents_retrieved: usize,
    context: Vec<ScoredCandidate>,
}

/// End-to-end retrieval-augmented answering
pub struct RAGPipeline {
    retrieval_engine: RetrievalEngine,
    expander: QueryExpander,
    reranker: ReRanker,
    generator: AnswerGenerator,
    config: Config,
}

impl RAGPipeline {
    /// Create the pipeline; builds the keyword index from `store`
    pub async fn new(
        store: Arc<dyn PassageStore>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        config: Config,
    ) -> Result<Self> {
        config.validate()?;
        let call_timeout = config.call_timeout();

        let retrieval_engine =
            RetrievalEngine::new(store, embedder, config.retrieval.clone(), call_timeout).await?;
        let expander = QueryExpander::new(llm.clone(), &config.prompts.domain_description, call_timeout);
        let reranker = ReRanker::new(llm.clone(), call_timeout);
        let generator = AnswerGenerator::new(llm, config.prompts.clone(), call_timeout);

        info!(
            chunks = retrieval_engine.indexed_chunks(),
            "pipeline ready"
        );

        Ok(Self {
            retrieval_engine,
            expander,
            reranker,
            generator,
            config,
        })
    }

    /// Run the full pipeline for `query`
    ///
    /// Expansion and rerank failures degrade to the unexpanded query and
    /// the fused order; retrieval and generation failures abort the query.
    pub async fn execute(&self, query: &str, options: &QueryOptions) -> Result<RAGResult> {
        let started = Instant::now();
        let mut tracker = StageTracker::new();

        let PreparedContext {
            expansion,
            documents_retrieved,
            context,
        } = self.prepare_context(query, options, &mut tracker).await?;
        let documents_reranked = context.len();

        // Step 4: Generate
        let answer = match self
            .generator
            .generate(query, &context, options.with_sources)
            .await
        {
            Ok(answer) => answer,
            Err(e) => return Err(tracker.fail(e)),
        };
        tracker.advance(StageEvent::Generate)?;
        tracker.advance(StageEvent::Return)?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            documents_retrieved,
            documents_reranked,
            refused = answer.is_refusal(),
            elapsed_ms,
            "query answered"
        );

        Ok(RAGResult {
            query: query.to_string(),
            answer,
            expansion,
            stages: tracker.into_trail(),
            documents_retrieved,
            documents_reranked,
            elapsed_ms,
        })
    }

    /// Candidates the generator would see for `query`
    ///
    /// Runs expansion, retrieval and reranking as `options` select, without
    /// generation. Evaluation scores this list.
    pub async fn retrieve_context(
        &self,
        query: &str,
        options: &QueryOptions,
    ) -> Result<Vec<ScoredCandidate>> {
        let mut tracker = StageTracker::new();
        let prepared = self.prepare_context(query, options, &mut tracker).await?;
        Ok(prepared.context)
    }

    /// Answer `query`, returning only the answer
    pub async fn answer_query(&self, query: &str, options: &QueryOptions) -> Result<Answer> {
        let result = self.execute(query, options).await?;
        Ok(result.answer)
    }

    /// Ranked candidates for `query` without expansion, reranking or generation
    pub async fn retrieve_only(
        &self,
        query: &str,
        filters: Option<Filter>,
    ) -> Result<Vec<ScoredCandidate>> {
        let params = SearchParams {
            top_k: self.config.retrieval.top_k,
            filters,
            hybrid: self.config.features.use_hybrid_search,
        };
        self.retrieval_engine.retrieve(query, &params).await
    }

    /// Ranked candidates with explicit search parameters
    pub async fn retrieve_with_params(
        &self,
        query: &str,
        params: &SearchParams,
    ) -> Result<Vec<ScoredCandidate>> {
        self.retrieval_engine.retrieve(query, params).await
    }

    /// Default options derived from this pipeline's configuration
    pub fn default_options(&self) -> QueryOptions {
        QueryOptions::from_config(&self.config)
    }

    /// Get current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The fixed refusal sentence callers can match against
    pub fn refusal_message(&self) -> &str {
        self.generator.refusal_message()
    }

    async fn prepare_context(
        &self,
        query: &str,
        options: &QueryOptions,
        tracker: &mut StageTracker,
    ) -> Result<PreparedContext> {
        if query.trim().is_empty() {
            return Err(tracker.fail(PipelineError::InvalidInput(
                "query must not be empty".to_string(),
            )));
        }

        // Step 1: Expand
        let expansion = if options.use_expansion {
            self.expand(query, tracker).await?
        } else {
            None
        };
        let retrieval_query = expansion
            .as_ref()
            .map(|e| e.expanded_query.as_str())
            .unwrap_or(query);

        // Step 2: Retrieve (filters are applied inside, after fusion)
        let params = SearchParams {
            top_k: options.top_k,
            filters: options.filters.clone(),
            hybrid: options.use_hybrid,
        };
        let candidates = match self.retrieval_engine.retrieve(retrieval_query, &params).await {
            Ok(candidates) => candidates,
            Err(e) => return Err(tracker.fail(e)),
        };
        tracker.advance(StageEvent::Retrieve)?;
        if params.filters.as_ref().is_some_and(|f| !f.is_empty()) {
            tracker.advance(StageEvent::Filter)?;
        }
        let documents_retrieved = candidates.len();

        // Step 3: Rerank against the original query
        let context = if options.use_rerank && !candidates.is_empty() {
            self.rerank(candidates, query, tracker).await?
        } else {
            candidates
        };

        Ok(PreparedContext {
            expansion,
            documents_retrieved,
            context,
        })
    }

    async fn expand(
        &self,
        query: &str,
        tracker: &mut StageTracker,
    ) -> Result<Option<ExpansionResult>> {
        let words = query.split_whitespace().count();
        if words < self.config.expansion.min_query_words {
            debug!(words, "query too short, skipping expansion");
            return Ok(None);
        }

        match self
            .expander
            .expand(query, self.config.expansion.max_expansions)
            .await
        {
            Ok(expansion) => {
                tracker.advance(StageEvent::Expand)?;
                Ok(Some(expansion))
            }
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "query expansion failed, using original query");
                Ok(None)
            }
            Err(e) => Err(tracker.fail(e)),
        }
    }

    async fn rerank(
        &self,
        candidates: Vec<ScoredCandidate>,
        query: &str,
        tracker: &mut StageTracker,
    ) -> Result<Vec<ScoredCandidate>> {
        let top_n = self.config.reranking.top_n;
        // keep a fused-order copy in case every batch fails
        let mut fused_order = candidates.clone();

        match self
            .reranker
            .rerank(candidates, query, top_n, self.config.reranking.batch_size)
            .await
        {
            Ok(reranked) => {
                tracker.advance(StageEvent::Rerank)?;
                Ok(reranked)
            }
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "reranking failed, using fused order");
                fused_order.truncate(top_n);
                Ok(fused_order)
            }
            Err(e) => Err(tracker.fail(e)),
        }
    }
}
