// Hybrid retrieval: keyword + semantic rankings, fused and filtered
pub mod candidate;
pub mod engine;
pub mod filter;
pub mod fusion;

pub use candidate::ScoredCandidate;
pub use engine::{RetrievalEngine, SearchParams};
pub use filter::Filter;
pub use fusion::reciprocal_rank_fusion;
