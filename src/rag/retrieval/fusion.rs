//! Reciprocal-rank fusion
//!
//! fused(d) = Σ 1 / (κ + rank_i(d)) over the rankings containing d.
//! Only positions matter, so BM25 scores and vector distances never need
//! to be calibrated against each other.

use crate::rag::retrieval::candidate::{by_fused_score, ScoredCandidate};
use crate::store::Chunk;
use std::collections::HashMap;
use std::sync::Arc;

/// Default smoothing constant
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Contribution of a 1-based rank
pub fn reciprocal_rank(rank: usize, k: f64) -> f64 {
    1.0 / (k + rank as f64)
}

/// Fuse a lexical and a semantic ranking (both best-first) into one candidate list
///
/// Pass an empty `lexical` slice for semantic-only retrieval. The result is
/// sorted by descending fused score with ties broken by semantic rank.
pub fn reciprocal_rank_fusion(
    lexical: &[Arc<Chunk>],
    semantic: &[Arc<Chunk>],
    k: f64,
) -> Vec<ScoredCandidate> {
    let mut by_id: HashMap<&str, ScoredCandidate> = HashMap::new();

    for (idx, chunk) in semantic.iter().enumerate() {
        let rank = idx + 1;
        let entry = by_id.entry(chunk.id.as_str()).or_insert_with(|| ScoredCandidate {
            chunk: Arc::clone(chunk),
            lexical_rank: None,
            semantic_rank: None,
            fused_score: 0.0,
            final_score: None,
        });
        if entry.semantic_rank.is_none() {
            entry.semantic_rank = Some(rank);
            entry.fused_score += reciprocal_rank(rank, k);
        }
    }

    for (idx, chunk) in lexical.iter().enumerate() {
        let rank = idx + 1;
        let entry = by_id.entry(chunk.id.as_str()).or_insert_with(|| ScoredCandidate {
            chunk: Arc::clone(chunk),
            lexical_rank: None,
            semantic_rank: None,
            fused_score: 0.0,
            final_score: None,
        });
        if entry.lexical_rank.is_none() {
            entry.lexical_rank = Some(rank);
            entry.fused_score += reciprocal_rank(rank, k);
        }
    }

    let mut fused: Vec<ScoredCandidate> = by_id.into_values().collect();
    fused.sort_by(by_fused_score);
    fused
}
