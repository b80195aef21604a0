// Retrieval-augmented answering pipeline
//
// Components:
// - Query Expansion: domain synonyms and acronyms via the model
// - Lexical Index: BM25 keyword scoring over the corpus
// - Retrieval Engine: hybrid keyword + vector search fused by reciprocal rank
// - Re-ranking: model-judged relevance over the fused candidates
// - Context Builder: assemble passages for the grounded prompt
// - Generator: grounded answer with a fixed out-of-domain refusal
// - Pipeline: end-to-end orchestration over the stage state machine

pub mod expansion;
pub mod lexical;
pub mod retrieval;
pub mod reranking;
pub mod context;
pub mod generator;
pub mod state;
pub mod pipeline;

// Re-export key types
pub use expansion::{ExpansionResult, QueryExpander};
pub use retrieval::{Filter, RetrievalEngine, ScoredCandidate, SearchParams};
pub use reranking::ReRanker;
pub use context::ContextBuilder;
pub use generator::{Answer, AnswerGenerator, SourceAttribution};
pub use state::{PipelineStage, StageEvent};
pub use pipeline::{QueryOptions, RAGPipeline, RAGResult};
