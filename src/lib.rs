//! gridtutor - Domain-restricted question answering
//!
//! Answers questions about electrical engineering, renewable energy, power
//! systems and smart grids from a fixed, pre-chunked corpus, refusing
//! anything outside that domain.
//!
//! # Architecture
//!
//! - **Collaborators**: passage store and model client behind traits
//! - **Pipeline**: expansion, hybrid BM25 + vector retrieval, reranking, grounded generation
//! - **Tooling**: retrieval evaluation and the CLI

pub mod errors;
pub mod config;
pub mod timeout;

// Re-export commonly used types
pub use errors::{GenerationErrorKind, PipelineError, Result};

// External collaborators
pub mod llm;
pub mod store;

// Retrieval-augmented pipeline
pub mod rag;
pub use rag::{Answer, QueryOptions, RAGPipeline, RAGResult};

pub mod evaluation;

// CLI & logging
pub mod cli;
pub mod logging;
