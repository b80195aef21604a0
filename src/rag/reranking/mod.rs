// LLM reranking module
pub mod scorer;

pub use scorer::{parse_choices, Choice, ReRanker};
