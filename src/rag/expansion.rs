// Query expansion: enrich a query with domain synonyms and acronyms
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{PipelineError, Result};
use crate::llm::{LanguageModel, LlmError};
use crate::timeout::bounded;

/// Outcome of expanding one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionResult {
    pub original_query: String,
    /// At most `max_expansions` terms, in the order the model produced them
    pub expansion_terms: Vec<String>,
    /// `original_query` followed by the space-joined terms
    pub expanded_query: String,
}

impl ExpansionResult {
    /// Result carrying the query through unchanged
    pub fn unexpanded(query: &str) -> Self {
        Self {
            original_query: query.to_string(),
            expansion_terms: Vec::new(),
            expanded_query: query.to_string(),
        }
    }

    fn from_terms(query: &str, terms: Vec<String>) -> Self {
        let expanded_query = if terms.is_empty() {
            query.to_string()
        } else {
            format!("{} {}", query, terms.join(" "))
        };
        Self {
            original_query: query.to_string(),
            expansion_terms: terms,
            expanded_query,
        }
    }
}

/// LLM-backed query expander
pub struct QueryExpander {
    llm: Arc<dyn LanguageModel>,
    domain_description: String,
    call_timeout: Duration,
}

impl QueryExpander {
    pub fn new(llm: Arc<dyn LanguageModel>, domain_description: &str, call_timeout: Duration) -> Self {
        Self {
            llm,
            domain_description: domain_description.to_string(),
            call_timeout,
        }
    }

    /// Expand `query` with up to `max_expansions` related terms
    ///
    /// Model failures surface as `ExpansionFailure`; falling back to the
    /// raw query is the caller's decision.
    pub async fn expand(&self, query: &str, max_expansions: usize) -> Result<ExpansionResult> {
        if query.trim().is_empty() {
            return Err(PipelineError::InvalidInput("query must not be empty".to_string()));
        }
        if max_expansions == 0 {
            return Ok(ExpansionResult::unexpanded(query));
        }

        let prompt = self.build_prompt(query, max_expansions);
        let response = bounded(self.call_timeout, self.llm.complete(&prompt), |ms| {
            LlmError::Timeout { duration_ms: ms }
        })
        .await
        .map_err(|e| PipelineError::ExpansionFailure(e.to_string()))?;

        let terms = parse_terms(&response, max_expansions);
        debug!(?terms, "expanded query");
        Ok(ExpansionResult::from_terms(query, terms))
    }

    fn build_prompt(&self, query: &str, max_expansions: usize) -> String {
        format!(
            "You are an expert in {domain}.\n\
             Your task is to expand the user's query with related technical terms, synonyms, and acronyms.\n\n\
             User Query: {query}\n\n\
             Generate up to {max} related terms that would help find relevant information about this query.\n\
             Focus on:\n\
             1. Technical synonyms (e.g., \"PV\" for \"solar panels\")\n\
             2. Related acronyms (e.g., \"BESS\" for \"battery energy storage\")\n\
             3. Domain-specific terminology (e.g., \"MPPT\" for solar optimization)\n\
             4. Alternative phrasings of the same concept\n\n\
             Return ONLY the expansion terms, one per line, without explanations.\n\
             If the query is already very specific with technical terms, return fewer or no expansions.\n\n\
             Expansion terms:",
            domain = self.domain_description,
            query = query,
            max = max_expansions,
        )
    }
}

/// One term per non-empty, non-comment line, list markers stripped
pub fn parse_terms(response: &str, max_expansions: usize) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(strip_list_marker)
        .filter(|term| !term.is_empty())
        .take(max_expansions)
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim_start_matches(['-', '*', '•']).trim_start();
    match line.split_once(". ") {
        Some((number, rest)) if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) => {
            rest.trim()
        }
        _ => line.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        reply: std::result::Result<String, LlmError>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(reply: std::result::Result<String, LlmError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for Scripted {
        async fn complete(&self, prompt: &str) -> std::result::Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone()
        }
    }

    fn expander(llm: Arc<Scripted>) -> QueryExpander {
        QueryExpander::new(llm, "power systems", Duration::from_secs(1))
    }

    #[test]
    fn test_parse_terms() {
        let terms = parse_terms("photovoltaic\n\n# note\n- PV\n2. MPPT\n  inverter  \n", 10);
        assert_eq!(terms, vec!["photovoltaic", "PV", "MPPT", "inverter"]);
    }

    #[test]
    fn test_parse_terms_truncates() {
        assert_eq!(parse_terms("a\nb\nc\nd", 2), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_expand_appends_terms() {
        let llm = Scripted::new(Ok("photovoltaic\nPV\nMPPT\ninverter".to_string()));
        let result = expander(llm.clone())
            .expand("How do solar panels work?", 3)
            .await
            .unwrap();

        assert_eq!(result.expansion_terms, vec!["photovoltaic", "PV", "MPPT"]);
        assert_eq!(
            result.expanded_query,
            "How do solar panels work? photovoltaic PV MPPT"
        );
        assert!(result.expanded_query.starts_with(&result.original_query));

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("up to 3 related terms"));
    }

    #[tokio::test]
    async fn test_empty_response_keeps_query() {
        let llm = Scripted::new(Ok("\n\n".to_string()));
        let result = expander(llm).expand("BESS sizing", 5).await.unwrap();
        assert!(result.expansion_terms.is_empty());
        assert_eq!(result.expanded_query, "BESS sizing");
    }

    #[tokio::test]
    async fn test_zero_expansions_skips_model() {
        let llm = Scripted::new(Ok("PV".to_string()));
        let result = expander(llm.clone()).expand("solar", 0).await.unwrap();
        assert_eq!(result, ExpansionResult::unexpanded("solar"));
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let llm = Scripted::new(Err(LlmError::RateLimited("slow down".to_string())));
        let err = expander(llm).expand("solar", 5).await.unwrap_err();
        assert!(matches!(err, PipelineError::ExpansionFailure(_)));
    }
}
