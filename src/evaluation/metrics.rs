//! Retrieval quality metrics
//!
//! A retrieved chunk is relevant when its text contains any of the expected
//! topics, compared case-insensitively. Only the first `top_k` results count.

use serde::{Deserialize, Serialize};

use crate::rag::retrieval::ScoredCandidate;

/// Expected topic found in a retrieved chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMatch {
    /// 1-based position in the retrieved list
    pub rank: usize,
    pub topic: String,
    pub score: f64,
}

/// First expected topic occurring in `text`
fn matching_topic<'a>(text: &str, expected_topics: &'a [String]) -> Option<&'a str> {
    let lowered = text.to_lowercase();
    expected_topics
        .iter()
        .find(|topic| !topic.is_empty() && lowered.contains(&topic.to_lowercase()))
        .map(String::as_str)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitResult {
    pub hit: bool,
    pub matching_chunks: Vec<TopicMatch>,
    pub total_retrieved: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitRateSummary {
    pub hit_rate: f64,
    pub total_queries: usize,
    pub total_hits: usize,
    pub queries_missed: usize,
}

/// Hit rate: did any of the top-k results contain a relevant chunk?
#[derive(Debug, Clone)]
pub struct HitRateEvaluator {
    top_k: usize,
}

impl HitRateEvaluator {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    pub fn evaluate_query(&self, retrieved: &[ScoredCandidate], expected_topics: &[String]) -> HitResult {
        let considered = &retrieved[..retrieved.len().min(self.top_k)];
        let matching_chunks: Vec<TopicMatch> = considered
            .iter()
            .enumerate()
            .filter_map(|(i, candidate)| {
                matching_topic(&candidate.chunk.text, expected_topics).map(|topic| TopicMatch {
                    rank: i + 1,
                    topic: topic.to_string(),
                    score: candidate.relevance(),
                })
            })
            .collect();

        HitResult {
            hit: !matching_chunks.is_empty(),
            matching_chunks,
            total_retrieved: considered.len(),
        }
    }

    pub fn evaluate_dataset(&self, results: &[HitResult]) -> HitRateSummary {
        let total_queries = results.len();
        let total_hits = results.iter().filter(|r| r.hit).count();
        HitRateSummary {
            hit_rate: ratio(total_hits, total_queries),
            total_queries,
            total_hits,
            queries_missed: total_queries - total_hits,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankResult {
    pub reciprocal_rank: f64,
    pub first_relevant_rank: Option<usize>,
}

impl RankResult {
    pub fn found_relevant(&self) -> bool {
        self.first_relevant_rank.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MrrSummary {
    pub mrr: f64,
    pub total_queries: usize,
    pub queries_with_relevant: usize,
    /// Share of queries with any relevant result
    pub coverage: f64,
}

/// Mean reciprocal rank of the first relevant result
#[derive(Debug, Clone)]
pub struct MrrEvaluator {
    top_k: usize,
}

impl MrrEvaluator {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    pub fn evaluate_query(&self, retrieved: &[ScoredCandidate], expected_topics: &[String]) -> RankResult {
        let first_relevant_rank = retrieved
            .iter()
            .take(self.top_k)
            .position(|c| matching_topic(&c.chunk.text, expected_topics).is_some())
            .map(|i| i + 1);

        RankResult {
            reciprocal_rank: first_relevant_rank.map_or(0.0, |rank| 1.0 / rank as f64),
            first_relevant_rank,
        }
    }

    pub fn evaluate_dataset(&self, results: &[RankResult]) -> MrrSummary {
        let total_queries = results.len();
        let queries_with_relevant = results.iter().filter(|r| r.found_relevant()).count();
        let total_rr: f64 = results.iter().map(|r| r.reciprocal_rank).sum();
        MrrSummary {
            mrr: if total_queries == 0 {
                0.0
            } else {
                total_rr / total_queries as f64
            },
            total_queries,
            queries_with_relevant,
            coverage: ratio(queries_with_relevant, total_queries),
        }
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
