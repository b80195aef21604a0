//! Shared fixtures for pipeline integration tests
//!
//! `ConceptEmbedder` maps text onto four concept axes by trigger words, and
//! `ScriptedModel` answers each of the three prompt kinds from a script.

#![allow(dead_code)]

use async_trait::async_trait;
use gridtutor::config::{Config, DistanceMetric};
use gridtutor::llm::{Embedder, LanguageModel, LlmError};
use gridtutor::store::{Chunk, InMemoryStore, Metadata};
use gridtutor::RAGPipeline;
use std::sync::{Arc, Mutex};

const AXES: &[&[&str]] = &[
    &["solar", "photovoltaic", "pv", "sunlight"],
    &["wind", "turbine", "turbines", "blades"],
    &["battery", "batteries", "storage", "lithium", "charge", "discharge"],
    &["grid", "frequency", "transmission"],
];

/// Trigger-word counts per concept axis
pub fn concept_vector(text: &str) -> Vec<f32> {
    let tokens: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();

    AXES.iter()
        .map(|triggers| tokens.iter().filter(|t| triggers.contains(&t.as_str())).count() as f32)
        .collect()
}

pub struct ConceptEmbedder;

#[async_trait]
impl Embedder for ConceptEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(concept_vector(text))
    }
}

pub struct DownEmbedder;

#[async_trait]
impl Embedder for DownEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Err(LlmError::Transport("connection refused".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Expansion,
    Rerank,
    Generation,
}

pub fn prompt_kind(prompt: &str) -> PromptKind {
    if prompt.contains("Expansion terms:") {
        PromptKind::Expansion
    } else if prompt.contains("Respond with the numbers of the documents") {
        PromptKind::Rerank
    } else {
        PromptKind::Generation
    }
}

/// Model that answers by prompt kind
///
/// Rerank replies score document `i` of each batch with relevance `i`, so a
/// successful rerank reverses the fused order. Generation refuses any
/// question mentioning pizza.
pub struct ScriptedModel {
    pub expansion: Result<String, LlmError>,
    pub rerank: Option<LlmError>,
    pub generation: Result<String, LlmError>,
    pub calls: Mutex<Vec<PromptKind>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            expansion: Ok("photovoltaic\nPV".to_string()),
            rerank: None,
            generation: Ok("Solar panels use photovoltaic modules.".to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls_of(&self, kind: PromptKind) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| **k == kind).count()
    }

    fn rerank_reply(prompt: &str) -> String {
        let documents = prompt
            .split_once("Let's try this now:")
            .map(|(_, rest)| rest.matches("Document ").count())
            .unwrap_or(0);
        (1..=documents)
            .map(|i| format!("Doc: {}, Relevance: {}", i, i.min(10)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn generation_reply(&self, prompt: &str) -> Result<String, LlmError> {
        let question = prompt.rsplit("Question: ").next().unwrap_or("");
        if question.to_lowercase().contains("pizza") {
            return Ok(Config::default().prompts.refusal_message);
        }
        self.generation.clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let kind = prompt_kind(prompt);
        self.calls.lock().unwrap().push(kind);
        match kind {
            PromptKind::Expansion => self.expansion.clone(),
            PromptKind::Rerank => match &self.rerank {
                Some(error) => Err(error.clone()),
                None => Ok(Self::rerank_reply(prompt)),
            },
            PromptKind::Generation => self.generation_reply(prompt),
        }
    }
}

pub fn chunk(id: &str, topic: &str, text: &str) -> Chunk {
    let mut metadata = Metadata::new();
    metadata.insert("topic".to_string(), topic.to_string());
    metadata.insert("source".to_string(), format!("{}_notes.pdf", topic));
    Chunk {
        id: id.to_string(),
        text: text.to_string(),
        metadata,
        embedding: concept_vector(text),
    }
}

/// Nine-chunk corpus across four topics
pub fn corpus() -> Vec<Chunk> {
    vec![
        chunk(
            "solar-1",
            "solar",
            "Solar panels turn sunlight into direct current through photovoltaic modules.",
        ),
        chunk("solar-2", "solar", "Inverters convert the solar array output for the grid."),
        chunk("wind-1", "wind", "Wind turbines convert moving air into rotation of the blades."),
        chunk("wind-2", "wind", "Offshore wind farms suffer wake losses between turbine rows."),
        chunk("store-1", "storage", "Lithium packs lose capacity with each charge and discharge cycle."),
        chunk("store-2", "storage", "Batteries charge from rooftop solar during the day."),
        chunk("store-3", "storage", "Lithium batteries discharge at night to cover peak demand."),
        chunk("bess-1", "storage", "BESS sizing: a BESS is rated in MW and MWh."),
        chunk(
            "grid-1",
            "grid",
            "Grid frequency must stay near fifty hertz for stable transmission.",
        ),
    ]
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retrieval.distance = DistanceMetric::Cosine;
    config.llm.timeout_secs = 5;
    config
}

pub async fn pipeline_with(
    chunks: Vec<Chunk>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<ScriptedModel>,
    config: Config,
) -> RAGPipeline {
    let store = InMemoryStore::from_chunks(chunks, config.retrieval.distance).unwrap();
    RAGPipeline::new(Arc::new(store), embedder, llm, config)
        .await
        .unwrap()
}

pub async fn pipeline(llm: Arc<ScriptedModel>) -> RAGPipeline {
    pipeline_with(corpus(), Arc::new(ConceptEmbedder), llm, test_config()).await
}
