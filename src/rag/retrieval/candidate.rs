//! Per-query scored candidate shared by every pipeline stage

use crate::store::Chunk;
use std::cmp::Ordering;
use std::sync::Arc;

/// A chunk under consideration for one query
///
/// Ranks are 1-based positions in the respective base ranking.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub chunk: Arc<Chunk>,
    pub lexical_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
    /// Reciprocal-rank fusion score, always >= 0
    pub fused_score: f64,
    /// Rerank relevance in [0, 1], set by the reranker
    pub final_score: Option<f64>,
}

impl ScoredCandidate {
    pub fn id(&self) -> &str {
        &self.chunk.id
    }

    /// Score used for ordering and source attribution
    pub fn relevance(&self) -> f64 {
        self.final_score.unwrap_or(self.fused_score)
    }
}

/// Tie-break shared by all orderings: semantic rank (absent last), then chunk id
pub fn tie_break(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    match (a.semantic_rank, b.semantic_rank) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}

/// Total order: descending fused score, then [`tie_break`]
pub fn by_fused_score(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.fused_score
        .partial_cmp(&a.fused_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| tie_break(a, b))
}
