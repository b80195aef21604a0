//! BM25 keyword scoring over the corpus
//!
//! An inverted index built once from the passage store. Only chunks sharing
//! at least one term with the query are scored, so a query with no keyword
//! overlap yields an empty ranking (and fusion degrades to semantic order).

use crate::store::Chunk;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Words carrying no retrieval signal
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "how", "in",
    "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when", "where",
    "which", "who", "why", "with",
];

/// Lowercased alphanumeric terms, stopwords removed
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Inverse document frequency, always >= 0
///
/// IDF = ln(1 + (N - df + 0.5) / (df + 0.5))
pub fn idf(total_documents: usize, doc_frequency: usize) -> f64 {
    if doc_frequency == 0 {
        return 0.0;
    }
    let n = total_documents as f64;
    let df = doc_frequency as f64;
    (1.0 + ((n - df + 0.5) / (df + 0.5)).max(0.0)).ln()
}

/// One chunk's keyword relevance
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub chunk: Arc<Chunk>,
    pub score: f64,
}

/// Inverted index with BM25 scoring
pub struct Bm25Index {
    chunks: Vec<Arc<Chunk>>,
    /// term -> (chunk index, term frequency)
    postings: HashMap<String, Vec<(usize, u32)>>,
    doc_lengths: Vec<u32>,
    avg_doc_length: f64,
    k1: f64,
    b: f64,
}

impl Bm25Index {
    /// Build the index over every chunk
    pub fn build(chunks: Vec<Arc<Chunk>>, k1: f64, b: f64) -> Self {
        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();
        let mut doc_lengths = Vec::with_capacity(chunks.len());

        for (idx, chunk) in chunks.iter().enumerate() {
            let terms = tokenize(&chunk.text);
            doc_lengths.push(terms.len() as u32);

            let mut freqs: HashMap<String, u32> = HashMap::new();
            for term in terms {
                *freqs.entry(term).or_insert(0) += 1;
            }
            for (term, tf) in freqs {
                postings.entry(term).or_default().push((idx, tf));
            }
        }

        let total: u64 = doc_lengths.iter().map(|&l| l as u64).sum();
        let avg_doc_length = if chunks.is_empty() {
            0.0
        } else {
            total as f64 / chunks.len() as f64
        };

        Self {
            chunks,
            postings,
            doc_lengths,
            avg_doc_length,
            k1,
            b,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of chunks containing `term`
    pub fn document_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map(Vec::len).unwrap_or(0)
    }

    /// Chunks matching the query, best first, at most `limit`
    ///
    /// Ties are broken by chunk id so the ranking is reproducible.
    pub fn rank(&self, query: &str, limit: usize) -> Vec<LexicalHit> {
        let mut seen = HashSet::new();
        let query_terms: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();

        let mut scores: HashMap<usize, f64> = HashMap::new();
        for term in &query_terms {
            let Some(posting) = self.postings.get(term) else {
                continue;
            };
            let term_idf = idf(self.chunks.len(), posting.len());
            for &(idx, tf) in posting {
                *scores.entry(idx).or_insert(0.0) += term_idf * self.saturate(tf, self.doc_lengths[idx]);
            }
        }

        let mut hits: Vec<LexicalHit> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(idx, score)| LexicalHit {
                chunk: Arc::clone(&self.chunks[idx]),
                score,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(limit);
        hits
    }

    /// tf * (k1 + 1) / (tf + k1 * (1 - b + b * len / avg_len))
    fn saturate(&self, tf: u32, doc_length: u32) -> f64 {
        if self.avg_doc_length <= 0.0 {
            return 0.0;
        }
        let tf = tf as f64;
        let norm = 1.0 - self.b + self.b * (doc_length as f64 / self.avg_doc_length);
        tf * (self.k1 + 1.0) / (tf + self.k1 * norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Metadata;

    fn chunk(id: &str, text: &str) -> Arc<Chunk> {
        Arc::new(Chunk {
            id: id.to_string(),
            text: text.to_string(),
            metadata: Metadata::new(),
            embedding: vec![0.0],
        })
    }

    fn index() -> Bm25Index {
        Bm25Index::build(
            vec![
                chunk("1", "Battery energy storage systems (BESS) smooth renewable output."),
                chunk("2", "Wind turbines convert kinetic energy into electricity."),
                chunk("3", "Solar panels use photovoltaic cells. Solar output peaks at noon."),
                chunk("4", "Grid frequency regulation with BESS and demand response."),
            ],
            1.5,
            0.75,
        )
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("How does a BESS work? (e.g. Li-ion)"),
            vec!["bess", "work", "e", "g", "li", "ion"]
        );
    }

    #[test]
    fn test_idf_non_negative() {
        assert_eq!(idf(10, 0), 0.0);
        assert!(idf(10, 10) > 0.0);
        assert!(idf(10, 1) > idf(10, 5));
    }

    #[test]
    fn test_rank_matches_acronym() {
        let idx = index();
        assert_eq!(idx.document_frequency("bess"), 2);
        assert_eq!(idx.document_frequency("hydro"), 0);

        let hits = idx.rank("BESS", 10);
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(hits.len(), 2);
        assert!(ids.contains(&"1"));
        assert!(ids.contains(&"4"));
    }

    #[test]
    fn test_rank_no_overlap_is_empty() {
        assert!(index().rank("pizza recipe", 10).is_empty());
    }

    #[test]
    fn test_term_frequency_saturates() {
        let hits = index().rank("solar", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, "3");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_rank_is_sorted_and_limited() {
        let hits = index().rank("energy BESS output", 2);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_repeated_query_terms_count_once() {
        let idx = index();
        let once = idx.rank("wind", 1);
        let twice = idx.rank("wind wind wind", 1);
        assert_eq!(once[0].score, twice[0].score);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let idx = Bm25Index::build(vec![chunk("b", "inverter"), chunk("a", "inverter")], 1.5, 0.75);
        let hits = idx.rank("inverter", 10);
        assert_eq!(hits[0].chunk.id, "a");
        assert_eq!(hits[1].chunk.id, "b");
    }
}
