//! Configuration management for gridtutor
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.gridtutor/config.toml
//!
//! The loaded value is passed into the pipeline constructor and never
//! mutated behind its back.

use crate::errors::{PipelineError, Result};
use crate::llm::{DEFAULT_EMBEDDING_MODEL, DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration for gridtutor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub reranking: RerankConfig,
    pub expansion: ExpansionConfig,
    pub features: FeatureConfig,
    pub prompts: PromptConfig,
    pub corpus: CorpusConfig,
}

/// Model service connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub api_key: Option<String>,
    /// Deadline applied to every external call (embedding, search, completion)
    pub timeout_secs: u64,
}

/// Distance metric used by the passage store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared euclidean distance, lower is closer
    L2,
    /// 1 - cosine similarity, lower is closer
    Cosine,
}

/// Hybrid retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// BM25 term frequency saturation
    pub bm25_k1: f64,
    /// BM25 length normalization
    pub bm25_b: f64,
    /// Reciprocal-rank fusion smoothing constant
    pub rrf_k: f64,
    /// Base rankings are fetched at `top_k * oversample_factor` when filtering
    pub oversample_factor: usize,
    /// Keep doubling the fetch depth while a filter under-fills `top_k`
    pub adaptive_oversampling: bool,
    pub distance: DistanceMetric,
}

/// LLM reranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub top_n: usize,
    pub batch_size: usize,
}

/// Query expansion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub max_expansions: usize,
    /// Queries with fewer words than this are not expanded
    pub min_query_words: usize,
}

/// Default feature toggles and source display
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub use_query_expansion: bool,
    pub use_hybrid_search: bool,
    pub use_reranking: bool,
    pub show_sources: bool,
    pub max_sources_display: usize,
}

/// Domain prompt text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// System instruction restricting the assistant to the domain
    pub domain_instruction: String,
    /// Comma-separated list of in-domain subjects, used inside prompt templates
    pub domain_description: String,
    /// Fixed sentence emitted verbatim for out-of-domain questions
    pub refusal_message: String,
}

/// Corpus location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub path: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 1000,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            bm25_k1: 1.5,
            bm25_b: 0.75,
            rrf_k: 60.0,
            oversample_factor: 3,
            adaptive_oversampling: true,
            distance: DistanceMetric::L2,
        }
    }
}

impl RetrievalConfig {
    /// Reject settings the retriever cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(PipelineError::ConfigError(
                "top_k must be greater than 0".to_string(),
            ));
        }

        if self.oversample_factor == 0 {
            return Err(PipelineError::ConfigError(
                "oversample_factor must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.bm25_b) {
            return Err(PipelineError::ConfigError(
                "bm25_b must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.bm25_k1 < 0.0 {
            return Err(PipelineError::ConfigError(
                "bm25_k1 must not be negative".to_string(),
            ));
        }

        if self.rrf_k <= 0.0 {
            return Err(PipelineError::ConfigError(
                "rrf_k must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            top_n: 3,
            batch_size: 10,
        }
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_expansions: 5,
            min_query_words: 3,
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            use_query_expansion: true,
            use_hybrid_search: true,
            use_reranking: true,
            show_sources: true,
            max_sources_display: 3,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            domain_instruction: "You are an AI assistant specialized in electrical engineering, \
                renewable energy, power systems, and smart grids."
                .to_string(),
            domain_description: "electrical engineering, renewable energy, power systems, or smart grids"
                .to_string(),
            refusal_message: "I don't have information on this topic. Please ask about electrical \
                engineering, renewable energy, power systems, or smart grids."
                .to_string(),
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: "~/.gridtutor/corpus.json".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Config::default())
    }

    /// Standard configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".gridtutor").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.retrieval.validate()?;

        if self.reranking.top_n == 0 || self.reranking.batch_size == 0 {
            return Err(PipelineError::ConfigError(
                "top_n and batch_size must be greater than 0".to_string(),
            ));
        }

        if self.llm.timeout_secs == 0 {
            return Err(PipelineError::ConfigError(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.prompts.refusal_message.trim().is_empty() {
            return Err(PipelineError::ConfigError(
                "refusal_message must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::ConfigError(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Deadline for a single external call
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Get corpus file path
    pub fn corpus_path(&self) -> PathBuf {
        Self::expand_path(&self.corpus.path)
    }
}
