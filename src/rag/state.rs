//! Pipeline stage state machine
//!
//! One query moves linearly through the stages:
//!
//! ```text
//! Received → (Expanded) → Retrieved → (Filtered) → (Reranked) → Generated → Returned
//! ```
//!
//! Parenthesized stages may be skipped but never reordered. Any
//! non-terminal stage may fail; `Returned` and `Failed` are terminal.

use crate::errors::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of a single query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    /// Query accepted
    Received,

    /// Query expanded with domain terms
    Expanded,

    /// Hybrid candidates retrieved
    Retrieved,

    /// Metadata filter applied to the candidates
    Filtered,

    /// Candidates reranked by the model
    Reranked,

    /// Answer generated
    Generated,

    /// Answer handed back to the caller (terminal)
    Returned,

    /// A stage failed and short-circuited the rest (terminal)
    Failed,
}

/// Events that advance a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    Expand,
    Retrieve,
    Filter,
    Rerank,
    Generate,
    Return,
    Fail,
}

impl fmt::Display for StageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Returned | PipelineStage::Failed)
    }

    /// Attempt a stage transition
    ///
    /// Valid transitions:
    /// 1.  Received  → Expanded   (on: Expand)
    /// 2.  Received  → Retrieved  (on: Retrieve)
    /// 3.  Expanded  → Retrieved  (on: Retrieve)
    /// 4.  Retrieved → Filtered   (on: Filter)
    /// 5.  Retrieved → Reranked   (on: Rerank)
    /// 6.  Retrieved → Generated  (on: Generate)
    /// 7.  Filtered  → Reranked   (on: Rerank)
    /// 8.  Filtered  → Generated  (on: Generate)
    /// 9.  Reranked  → Generated  (on: Generate)
    /// 10. Generated → Returned   (on: Return)
    /// 11. non-terminal → Failed  (on: Fail)
    /// 12. Returned, Failed self-loop
    pub fn transition(&self, event: StageEvent) -> Result<PipelineStage> {
        use PipelineStage::*;
        use StageEvent::*;

        let next = match (self, event) {
            (Returned, _) => Returned,
            (Failed, _) => Failed,

            (_, Fail) => Failed,

            (Received, Expand) => Expanded,
            (Received | Expanded, Retrieve) => Retrieved,
            (Retrieved, Filter) => Filtered,
            (Retrieved | Filtered, Rerank) => Reranked,
            (Retrieved | Filtered | Reranked, Generate) => Generated,
            (Generated, Return) => Returned,

            (from, event) => {
                return Err(PipelineError::InvalidTransition {
                    from: format!("{:?}", from),
                    event: event.to_string(),
                    reason: format!("{:?} cannot follow {:?}", event, from),
                });
            }
        };

        Ok(next)
    }

    /// Events accepted from this stage
    pub fn valid_events(&self) -> Vec<StageEvent> {
        use PipelineStage::*;
        use StageEvent::*;

        match self {
            Received => vec![Expand, Retrieve, Fail],
            Expanded => vec![Retrieve, Fail],
            Retrieved => vec![Filter, Rerank, Generate, Fail],
            Filtered => vec![Rerank, Generate, Fail],
            Reranked => vec![Generate, Fail],
            Generated => vec![Return, Fail],
            Returned | Failed => vec![],
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PipelineStage::Received => "Received",
            PipelineStage::Expanded => "Query expanded",
            PipelineStage::Retrieved => "Passages retrieved",
            PipelineStage::Filtered => "Metadata filtered",
            PipelineStage::Reranked => "Reranked",
            PipelineStage::Generated => "Answer generated",
            PipelineStage::Returned => "Returned",
            PipelineStage::Failed => "Failed",
        }
    }
}

/// Current stage of one query plus the stages it went through
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: PipelineStage,
    trail: Vec<PipelineStage>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: PipelineStage::Received,
            trail: vec![PipelineStage::Received],
        }
    }

    /// Apply `event`, recording the new stage
    pub fn advance(&mut self, event: StageEvent) -> Result<PipelineStage> {
        let next = self.current.transition(event)?;
        if next != self.current {
            self.trail.push(next);
        }
        self.current = next;
        Ok(next)
    }

    /// Move to `Failed` and hand `error` back for propagation
    pub fn fail(&mut self, error: PipelineError) -> PipelineError {
        if !self.current.is_terminal() {
            self.trail.push(PipelineStage::Failed);
            self.current = PipelineStage::Failed;
        }
        error
    }

    pub fn current(&self) -> PipelineStage {
        self.current
    }

    pub fn trail(&self) -> &[PipelineStage] {
        &self.trail
    }

    pub fn into_trail(self) -> Vec<PipelineStage> {
        self.trail
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}
