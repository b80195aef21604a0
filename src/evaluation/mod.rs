//! Retrieval evaluation over a labelled query set
//!
//! Dataset format:
//!
//! ```json
//! {"queries": [{"id": "q1", "query": "...", "expected_topics": ["solar", "PV"]}]}
//! ```

pub mod metrics;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::errors::{PipelineError, Result};
use crate::rag::pipeline::{QueryOptions, RAGPipeline};

pub use metrics::{HitRateEvaluator, HitRateSummary, MrrEvaluator, MrrSummary};

/// One labelled query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalQuery {
    #[serde(default)]
    pub id: String,
    pub query: String,
    pub expected_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalDataset {
    pub queries: Vec<EvalQuery>,
}

impl EvalDataset {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidInput(format!("Failed to read dataset {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents)
            .map_err(|e| PipelineError::InvalidInput(format!("Failed to parse dataset: {}", e)))
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// Per-query evaluation line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub id: String,
    pub query: String,
    pub hit: bool,
    pub reciprocal_rank: f64,
    pub first_relevant_rank: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub top_k: usize,
    pub hybrid: bool,
    pub rerank: bool,
    pub total_queries: usize,
    pub hit_rate: HitRateSummary,
    pub mrr: MrrSummary,
    pub queries: Vec<QueryOutcome>,
}

/// Baseline and variant runs of one feature with the change in each metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    /// Feature being toggled, e.g. `reranking`
    pub feature: String,
    pub baseline: EvaluationReport,
    pub variant: EvaluationReport,
    /// `variant - baseline`
    pub hit_rate_delta: f64,
    pub mrr_delta: f64,
}

/// Run retrieval-only evaluation of `dataset` against `pipeline`
///
/// Hybrid search follows the pipeline configuration; expansion and
/// reranking are off.
pub async fn evaluate(pipeline: &RAGPipeline, dataset: &EvalDataset, top_k: usize) -> Result<EvaluationReport> {
    let options = QueryOptions {
        top_k,
        use_expansion: false,
        use_rerank: false,
        ..pipeline.default_options()
    };
    evaluate_with_options(pipeline, dataset, &options).await
}

/// Score the generator context `pipeline` builds for each query under `options`
///
/// The first `options.top_k` entries count, so with reranking enabled only
/// the reranked `top_n` are scored.
pub async fn evaluate_with_options(
    pipeline: &RAGPipeline,
    dataset: &EvalDataset,
    options: &QueryOptions,
) -> Result<EvaluationReport> {
    let top_k = options.top_k;
    let hit_rate_eval = HitRateEvaluator::new(top_k);
    let mrr_eval = MrrEvaluator::new(top_k);

    let mut hits = Vec::with_capacity(dataset.len());
    let mut ranks = Vec::with_capacity(dataset.len());
    let mut queries = Vec::with_capacity(dataset.len());

    for item in &dataset.queries {
        let retrieved = pipeline.retrieve_context(&item.query, options).await?;
        let hit = hit_rate_eval.evaluate_query(&retrieved, &item.expected_topics);
        let rank = mrr_eval.evaluate_query(&retrieved, &item.expected_topics);
        debug!(query = %item.query, hit = hit.hit, rr = rank.reciprocal_rank, "evaluated");

        queries.push(QueryOutcome {
            id: item.id.clone(),
            query: item.query.clone(),
            hit: hit.hit,
            reciprocal_rank: rank.reciprocal_rank,
            first_relevant_rank: rank.first_relevant_rank,
        });
        hits.push(hit);
        ranks.push(rank);
    }

    Ok(EvaluationReport {
        top_k,
        hybrid: options.use_hybrid,
        rerank: options.use_rerank,
        total_queries: dataset.len(),
        hit_rate: hit_rate_eval.evaluate_dataset(&hits),
        mrr: mrr_eval.evaluate_dataset(&ranks),
        queries,
    })
}

/// Evaluate `dataset` under `baseline` and `variant` options and report the change
pub async fn compare(
    pipeline: &RAGPipeline,
    dataset: &EvalDataset,
    feature: &str,
    baseline: &QueryOptions,
    variant: &QueryOptions,
) -> Result<Comparison> {
    let baseline = evaluate_with_options(pipeline, dataset, baseline).await?;
    let variant = evaluate_with_options(pipeline, dataset, variant).await?;
    info!(
        feature,
        hit_rate = variant.hit_rate.hit_rate,
        mrr = variant.mrr.mrr,
        "compared against baseline"
    );

    Ok(Comparison {
        feature: feature.to_string(),
        hit_rate_delta: variant.hit_rate.hit_rate - baseline.hit_rate.hit_rate,
        mrr_delta: variant.mrr.mrr - baseline.mrr.mrr,
        baseline,
        variant,
    })
}

/// Measure reranking (off vs on) and hybrid search (semantic-only vs hybrid)
///
/// Expansion stays off in every run so only the toggled feature differs.
pub async fn compare_features(
    pipeline: &RAGPipeline,
    dataset: &EvalDataset,
    top_k: usize,
) -> Result<Vec<Comparison>> {
    let base = QueryOptions {
        top_k,
        use_expansion: false,
        use_hybrid: pipeline.config().features.use_hybrid_search,
        use_rerank: false,
        ..pipeline.default_options()
    };

    let reranked = QueryOptions {
        use_rerank: true,
        ..base.clone()
    };
    let semantic = QueryOptions {
        use_hybrid: false,
        ..base.clone()
    };
    let hybrid = QueryOptions {
        use_hybrid: true,
        ..base.clone()
    };

    Ok(vec![
        compare(pipeline, dataset, "reranking", &base, &reranked).await?,
        compare(pipeline, dataset, "hybrid search", &semantic, &hybrid).await?,
    ])
}
