// LLM relevance reranking of retrieved candidates
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{PipelineError, Result};
use crate::llm::{LanguageModel, LlmError};
use crate::rag::retrieval::candidate::{tie_break, ScoredCandidate};
use crate::timeout::bounded;

/// Highest relevance the model is asked to assign
const MAX_RELEVANCE: f64 = 10.0;

/// One document the model chose, as parsed from its reply
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// 1-based position inside the batch
    pub document: usize,
    pub relevance: f64,
}

/// How a single batch was resolved
#[derive(Debug)]
enum BatchOutcome {
    /// Candidates the model kept, with final scores set
    Scored(Vec<ScoredCandidate>),
    /// Model unavailable or unintelligible; candidates kept in fused order
    Fallback(Vec<ScoredCandidate>),
}

/// Re-ranker asking the LLM to pick and score relevant candidates
pub struct ReRanker {
    llm: Arc<dyn LanguageModel>,
    call_timeout: Duration,
}

impl ReRanker {
    pub fn new(llm: Arc<dyn LanguageModel>, call_timeout: Duration) -> Self {
        Self { llm, call_timeout }
    }

    /// Re-rank `candidates` (in fused order) and keep at most `top_n`
    ///
    /// Candidates the model leaves out are judged irrelevant and dropped, so
    /// the result can be shorter than `top_n`. A batch whose call fails keeps
    /// its candidates, scored by fused score and ranked after every
    /// model-scored candidate. Only when every batch fails is
    /// `RerankFailure` returned.
    pub async fn rerank(
        &self,
        candidates: Vec<ScoredCandidate>,
        query: &str,
        top_n: usize,
        batch_size: usize,
    ) -> Result<Vec<ScoredCandidate>> {
        if batch_size == 0 {
            return Err(PipelineError::InvalidInput("batch_size must be greater than 0".to_string()));
        }
        if candidates.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let batches: Vec<Vec<ScoredCandidate>> = candidates
            .chunks(batch_size)
            .map(<[ScoredCandidate]>::to_vec)
            .collect();
        let batch_count = batches.len();

        let outcomes = join_all(
            batches
                .into_iter()
                .enumerate()
                .map(|(idx, batch)| self.score_batch(idx, batch, query)),
        )
        .await;

        let mut scored = Vec::new();
        let mut fallback = Vec::new();
        let mut failed_batches = 0;
        for outcome in outcomes {
            match outcome {
                BatchOutcome::Scored(kept) => scored.extend(kept),
                BatchOutcome::Fallback(kept) => {
                    failed_batches += 1;
                    fallback.extend(kept);
                }
            }
        }

        if failed_batches == batch_count {
            return Err(PipelineError::RerankFailure(format!(
                "all {} rerank batches failed",
                batch_count
            )));
        }

        scored.sort_by(by_final_score);
        // fallback keeps fused order, which the input already had
        scored.extend(fallback);
        scored.truncate(top_n);

        debug!(kept = scored.len(), failed_batches, "reranked candidates");
        Ok(scored)
    }

    async fn score_batch(&self, idx: usize, batch: Vec<ScoredCandidate>, query: &str) -> BatchOutcome {
        let prompt = build_prompt(&batch, query);
        let reply = bounded(self.call_timeout, self.llm.complete(&prompt), |ms| {
            LlmError::Timeout { duration_ms: ms }
        })
        .await;

        let choices = match reply {
            Ok(text) => parse_choices(&text, batch.len()),
            Err(e) => Err(e),
        };

        match choices {
            Ok(choices) => {
                let mut kept = Vec::with_capacity(choices.len());
                for choice in choices {
                    let mut candidate = batch[choice.document - 1].clone();
                    candidate.final_score = Some((choice.relevance / MAX_RELEVANCE).clamp(0.0, 1.0));
                    kept.push(candidate);
                }
                BatchOutcome::Scored(kept)
            }
            Err(e) => {
                warn!(batch = idx, error = %e, "rerank batch failed, keeping fused order");
                BatchOutcome::Fallback(
                    batch
                        .into_iter()
                        .map(|mut c| {
                            c.final_score = Some(c.fused_score);
                            c
                        })
                        .collect(),
                )
            }
        }
    }
}

fn by_final_score(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.relevance()
        .partial_cmp(&a.relevance())
        .unwrap_or(Ordering::Equal)
        .then_with(|| tie_break(a, b))
}

fn build_prompt(batch: &[ScoredCandidate], query: &str) -> String {
    let documents: Vec<String> = batch
        .iter()
        .enumerate()
        .map(|(i, c)| format!("Document {}:\n{}", i + 1, c.chunk.text.trim()))
        .collect();

    format!(
        "A list of documents is shown below. Each document has a number next to it. \
         A question is also provided.\n\
         Respond with the numbers of the documents you should consult to answer the question, \
         in order of relevance, as well as the relevance score. The relevance score is a number \
         from 1-10 based on how relevant you think the document is to the question.\n\
         Do not include any documents that are not relevant to the question.\n\
         If no document is relevant, respond with NONE.\n\n\
         Example format:\n\
         Document 1:\n<text of document 1>\n\n\
         Document 2:\n<text of document 2>\n\n\
         Question: <question>\n\
         Answer:\n\
         Doc: 2, Relevance: 7\n\n\
         Let's try this now:\n\n\
         {documents}\n\n\
         Question: {query}\n\
         Answer:\n",
        documents = documents.join("\n\n"),
        query = query,
    )
}

/// Parse `Doc: N, Relevance: S` lines
///
/// Out-of-range and repeated documents and non-positive scores are ignored.
/// A reply with content but no parseable line is an error unless one of
/// its lines is exactly `NONE`.
pub fn parse_choices(reply: &str, batch_len: usize) -> std::result::Result<Vec<Choice>, LlmError> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut choices: Vec<Choice> = Vec::new();
    let mut parsed_any = false;
    for line in trimmed.lines() {
        let Some(choice) = parse_choice_line(line) else {
            continue;
        };
        parsed_any = true;
        let in_range = choice.document >= 1 && choice.document <= batch_len;
        let repeated = choices.iter().any(|c| c.document == choice.document);
        if in_range && !repeated && choice.relevance > 0.0 {
            choices.push(choice);
        }
    }

    let says_none = trimmed
        .lines()
        .any(|line| line.trim().eq_ignore_ascii_case("none"));
    if !parsed_any && !says_none {
        return Err(LlmError::MalformedResponse(format!(
            "no document choices in rerank reply: {}",
            trimmed.chars().take(120).collect::<String>()
        )));
    }
    Ok(choices)
}

fn parse_choice_line(line: &str) -> Option<Choice> {
    let lowered = line.to_lowercase();
    let (doc_part, relevance_part) = lowered.split_once(',')?;
    let document = value_after_colon(doc_part, "doc")?.parse::<usize>().ok()?;
    let relevance = value_after_colon(relevance_part, "relevance")?.parse::<f64>().ok()?;
    Some(Choice { document, relevance })
}

fn value_after_colon<'a>(segment: &'a str, key: &str) -> Option<&'a str> {
    let (label, value) = segment.split_once(':')?;
    if !label.contains(key) {
        return None;
    }
    Some(value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Chunk, Metadata};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies in call order
    struct Scripted {
        replies: Mutex<VecDeque<std::result::Result<String, LlmError>>>,
    }

    impl Scripted {
        fn new(replies: Vec<std::result::Result<&str, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for Scripted {
        async fn complete(&self, _prompt: &str) -> std::result::Result<String, LlmError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn candidates(n: usize) -> Vec<ScoredCandidate> {
        (1..=n)
            .map(|i| ScoredCandidate {
                chunk: Arc::new(Chunk {
                    id: format!("c{}", i),
                    text: format!("text {}", i),
                    metadata: Metadata::new(),
                    embedding: vec![],
                }),
                lexical_rank: None,
                semantic_rank: Some(i),
                fused_score: 1.0 / (60.0 + i as f64),
                final_score: None,
            })
            .collect()
    }

    fn ids(list: &[ScoredCandidate]) -> Vec<&str> {
        list.iter().map(|c| c.id()).collect()
    }

    #[test]
    fn test_parse_choices() {
        let choices = parse_choices("Doc: 2, Relevance: 8\nDoc: 1, Relevance: 5.5\n", 3).unwrap();
        assert_eq!(
            choices,
            vec![
                Choice { document: 2, relevance: 8.0 },
                Choice { document: 1, relevance: 5.5 }
            ]
        );
    }

    #[test]
    fn test_parse_choices_ignores_invalid_entries() {
        let choices =
            parse_choices("Doc: 9, Relevance: 8\nDoc: 1, Relevance: 0\nDoc: 2, Relevance: 3\nDoc: 2, Relevance: 9", 3)
                .unwrap();
        assert_eq!(choices, vec![Choice { document: 2, relevance: 3.0 }]);
    }

    #[test]
    fn test_parse_choices_none_and_garbage() {
        assert!(parse_choices("NONE", 3).unwrap().is_empty());
        assert!(parse_choices("", 3).unwrap().is_empty());
        assert!(parse_choices("I think the second one", 3).is_err());
    }

    #[test]
    fn test_parse_choices_none_must_be_whole_line() {
        assert!(parse_choices("Answer:\n  none  \n", 3).unwrap().is_empty());
        assert!(matches!(
            parse_choices("None match exactly, but the second is closest", 3),
            Err(LlmError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_prose_reply_falls_back_instead_of_dropping() {
        let llm = Scripted::new(vec![
            Ok("Doc: 1, Relevance: 6"),
            Ok("None match exactly, but the second is closest"),
        ]);
        let ranker = ReRanker::new(llm, Duration::from_secs(1));
        let result = ranker.rerank(candidates(4), "q", 10, 2).await.unwrap();

        assert_eq!(ids(&result), vec!["c1", "c3", "c4"]);
        assert_eq!(result[1].final_score, Some(result[1].fused_score));
    }

    #[tokio::test]
    async fn test_rerank_orders_by_model_score() {
        let llm = Scripted::new(vec![Ok("Doc: 3, Relevance: 9\nDoc: 1, Relevance: 6")]);
        let ranker = ReRanker::new(llm, Duration::from_secs(1));
        let result = ranker.rerank(candidates(3), "q", 5, 10).await.unwrap();

        assert_eq!(ids(&result), vec!["c3", "c1"]);
        assert_eq!(result[0].final_score, Some(0.9));
    }

    #[tokio::test]
    async fn test_rerank_truncates_to_top_n() {
        let llm = Scripted::new(vec![Ok("Doc: 1, Relevance: 9\nDoc: 2, Relevance: 8\nDoc: 3, Relevance: 7")]);
        let ranker = ReRanker::new(llm, Duration::from_secs(1));
        let result = ranker.rerank(candidates(3), "q", 2, 10).await.unwrap();
        assert_eq!(ids(&result), vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn test_failed_batch_falls_back_to_fused_order() {
        let llm = Scripted::new(vec![
            Ok("Doc: 2, Relevance: 4"),
            Err(LlmError::Transport("reset".to_string())),
        ]);
        let ranker = ReRanker::new(llm, Duration::from_secs(1));
        let result = ranker.rerank(candidates(4), "q", 10, 2).await.unwrap();

        assert_eq!(ids(&result), vec!["c2", "c3", "c4"]);
        assert!(result.iter().all(|c| c.final_score.is_some()));
    }

    #[tokio::test]
    async fn test_all_batches_failing_is_rerank_failure() {
        let llm = Scripted::new(vec![
            Err(LlmError::RateLimited("429".to_string())),
            Err(LlmError::RateLimited("429".to_string())),
        ]);
        let ranker = ReRanker::new(llm, Duration::from_secs(1));
        let err = ranker.rerank(candidates(3), "q", 3, 2).await.unwrap_err();
        assert!(matches!(err, PipelineError::RerankFailure(_)));
    }

    #[tokio::test]
    async fn test_all_irrelevant_returns_empty() {
        let llm = Scripted::new(vec![Ok("NONE")]);
        let ranker = ReRanker::new(llm, Duration::from_secs(1));
        assert!(ranker.rerank(candidates(3), "q", 3, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let ranker = ReRanker::new(Scripted::new(vec![]), Duration::from_secs(1));
        assert!(matches!(
            ranker.rerank(candidates(1), "q", 1, 0).await,
            Err(PipelineError::InvalidInput(_))
        ));
    }
}
