//! In-memory passage store with exact nearest-neighbour search
//!
//! Loads a prebuilt corpus file of the form
//! `{"chunks": [{"id", "text", "metadata", "embedding"}, ...]}` and answers
//! vector queries by brute force. Suitable for corpora of a few thousand chunks.

use crate::config::DistanceMetric;
use crate::store::{Chunk, PassageStore, SemanticHit, StoreError};
use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct CorpusFile {
    chunks: Vec<Chunk>,
}

/// Exact-search store over a fixed set of chunks
pub struct InMemoryStore {
    chunks: Vec<Arc<Chunk>>,
    by_id: HashMap<String, usize>,
    dimension: usize,
    metric: DistanceMetric,
}

impl InMemoryStore {
    /// Build a store, validating unique ids and a single embedding dimension
    pub fn from_chunks(chunks: Vec<Chunk>, metric: DistanceMetric) -> Result<Self, StoreError> {
        let dimension = chunks.first().map(|c| c.embedding.len()).unwrap_or(0);
        let mut by_id = HashMap::with_capacity(chunks.len());

        for (idx, chunk) in chunks.iter().enumerate() {
            if chunk.embedding.len() != dimension || dimension == 0 {
                return Err(StoreError::Corrupt(format!(
                    "chunk '{}' has {} dimensions, expected {}",
                    chunk.id,
                    chunk.embedding.len(),
                    dimension
                )));
            }
            if by_id.insert(chunk.id.clone(), idx).is_some() {
                return Err(StoreError::Corrupt(format!("duplicate chunk id '{}'", chunk.id)));
            }
        }

        Ok(Self {
            chunks: chunks.into_iter().map(Arc::new).collect(),
            by_id,
            dimension,
            metric,
        })
    }

    /// Load a corpus file written by the corpus build
    pub fn load(path: &Path, metric: DistanceMetric) -> Result<Self, StoreError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Unavailable(format!("Failed to read corpus {}: {}", path.display(), e))
        })?;
        let corpus: CorpusFile = serde_json::from_str(&contents)
            .map_err(|e| StoreError::Corrupt(format!("Failed to parse corpus: {}", e)))?;

        Self::from_chunks(corpus.chunks, metric)
    }

    /// Embedding dimension shared by every chunk
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Unique `source` values, sorted
    pub fn available_sources(&self) -> Vec<String> {
        self.chunks
            .iter()
            .filter_map(|c| c.metadata.get("source").cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Chunk count per `topic` value
    pub fn topic_distribution(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for chunk in &self.chunks {
            if let Some(topic) = chunk.topic() {
                *counts.entry(topic.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (norm_a * norm_b)
                }
            }
        }
    }
}

#[async_trait]
impl PassageStore for InMemoryStore {
    async fn search_semantic(&self, vector: &[f32], k: usize) -> Result<Vec<SemanticHit>, StoreError> {
        if self.chunks.is_empty() {
            return Ok(Vec::new());
        }
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let mut hits: Vec<SemanticHit> = self
            .chunks
            .iter()
            .map(|chunk| SemanticHit {
                distance: self.distance(vector, &chunk.embedding),
                chunk: Arc::clone(chunk),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn get_chunk(&self, id: &str) -> Result<Arc<Chunk>, StoreError> {
        self.by_id
            .get(id)
            .map(|&idx| Arc::clone(&self.chunks[idx]))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn chunks(&self) -> Result<Vec<Arc<Chunk>>, StoreError> {
        Ok(self.chunks.clone())
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }
}
