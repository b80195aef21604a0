//! Passage store: immutable corpus chunks and nearest-neighbour search
//!
//! Chunks are created once during the corpus build and shared by `Arc`
//! between every stage of a query; nothing downstream copies or mutates them.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub use memory::InMemoryStore;

pub type ChunkId = String;

/// Chunk metadata (`source`, `topic`, `page`, ...), compared by exact string value
pub type Metadata = BTreeMap<String, String>;

/// A fixed-size unit of corpus text with its metadata and embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Originating document identifier, `"Unknown"` when the corpus lacks one
    pub fn source(&self) -> &str {
        self.metadata
            .get("source")
            .map(String::as_str)
            .unwrap_or("Unknown")
    }

    pub fn topic(&self) -> Option<&str> {
        self.metadata.get("topic").map(String::as_str)
    }

    pub fn page(&self) -> Option<&str> {
        self.metadata.get("page").map(String::as_str)
    }
}

/// One nearest-neighbour result, closest first
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub chunk: Arc<Chunk>,
    /// Lower is closer
    pub distance: f32,
}

/// Passage store failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("passage store unavailable: {0}")]
    Unavailable(String),

    #[error("chunk not found: {0}")]
    NotFound(ChunkId),

    #[error("query vector has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("corpus is corrupt: {0}")]
    Corrupt(String),

    #[error("store call timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

/// Read-only corpus with vector search
#[async_trait]
pub trait PassageStore: Send + Sync {
    /// The `k` chunks nearest to `vector`, ascending by distance
    async fn search_semantic(&self, vector: &[f32], k: usize) -> Result<Vec<SemanticHit>, StoreError>;

    /// Look up a chunk by id
    async fn get_chunk(&self, id: &str) -> Result<Arc<Chunk>, StoreError>;

    /// Every chunk in the corpus, used to build the lexical index
    async fn chunks(&self) -> Result<Vec<Arc<Chunk>>, StoreError>;

    /// Number of chunks in the corpus
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn get_chunk_text(&self, id: &str) -> Result<String, StoreError> {
        Ok(self.get_chunk(id).await?.text.clone())
    }

    async fn get_metadata(&self, id: &str) -> Result<Metadata, StoreError> {
        Ok(self.get_chunk(id).await?.metadata.clone())
    }
}
