//! Terminal rendering for answers, passages and reports
//!
//! Answers go to stdout; spinners and errors go to stderr.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::cli::Verbosity;
use crate::config::Config;
use crate::errors::{GenerationErrorKind, PipelineError};
use crate::evaluation::{Comparison, EvaluationReport};
use crate::rag::generator::SourceAttribution;
use crate::rag::pipeline::RAGResult;
use crate::rag::retrieval::ScoredCandidate;

/// Relevance as a percentage, `N/A` for a zero score
pub fn format_relevance(score: f64) -> String {
    if score > 0.0 {
        format!("{:.1}%", score * 100.0)
    } else {
        "N/A".to_string()
    }
}

pub fn format_duration(duration_ms: u64) -> String {
    if duration_ms >= 1000 {
        format!("{:.2}s", duration_ms as f64 / 1000.0)
    } else {
        format!("{}ms", duration_ms)
    }
}

/// Sources to show for a result: none for refusals, at most `max` otherwise
/// Signed metric change, e.g. `+0.250`
pub fn format_delta(delta: f64) -> String {
    format!("{:+.3}", delta)
}

pub fn visible_sources(result: &RAGResult, max: usize) -> &[SourceAttribution] {
    if result.answer.is_refusal() {
        return &[];
    }
    let sources = &result.answer.sources;
    &sources[..sources.len().min(max)]
}

/// User-facing guidance for a failed query
pub fn error_guidance(error: &PipelineError) -> String {
    match error {
        PipelineError::GenerationFailure { kind, .. } => match kind {
            GenerationErrorKind::AuthError => {
                "API key error. Check llm.api_key in your configuration.".to_string()
            }
            GenerationErrorKind::RateLimited => {
                "Rate limit or quota reached. Wait a moment and try again.".to_string()
            }
            GenerationErrorKind::ContentBlocked => {
                "The answer was blocked by the provider's safety filters. Try rephrasing, \
                 or ask about solar energy, wind power, batteries or smart grids."
                    .to_string()
            }
            GenerationErrorKind::Other => format!("Answer generation failed: {}", error),
        },
        PipelineError::RetrievalFailure(_) => format!(
            "The corpus or embedding service is unavailable: {}. Is Ollama running? (ollama serve)",
            error
        ),
        PipelineError::ConfigError(_) => format!("{} (see `gridtutor config`)", error),
        _ => format!("An error occurred: {}", error),
    }
}

/// Display manager for one CLI invocation
pub struct DisplayManager {
    verbosity: Verbosity,
    spinner: Option<ProgressBar>,
}

impl DisplayManager {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            spinner: None,
        }
    }

    /// Start a spinner on stderr (not in quiet mode)
    pub fn start_spinner(&mut self, message: &str) {
        if !self.verbosity.show_chrome() {
            return;
        }
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(pb);
    }

    pub fn finish_spinner(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }

    /// Show an answer, its sources and processing time
    pub fn show_answer(&mut self, result: &RAGResult, max_sources: usize) {
        self.finish_spinner();

        if !self.verbosity.show_chrome() {
            println!("{}", result.answer.text);
            return;
        }

        println!("\n{}\n", result.answer.text);

        let sources = visible_sources(result, max_sources);
        if !sources.is_empty() {
            println!("{}", "Sources:".bold().cyan());
            for (i, src) in sources.iter().enumerate() {
                let page = src
                    .page
                    .as_ref()
                    .map(|p| format!(", page {}", p))
                    .unwrap_or_default();
                println!(
                    "  {}. {}{} {}",
                    i + 1,
                    src.source,
                    page,
                    format!("(relevance: {})", format_relevance(src.relevance_score)).dimmed()
                );
            }
            println!();
        }

        if self.verbosity.show_trace() {
            if let Some(expansion) = &result.expansion {
                if !expansion.expansion_terms.is_empty() {
                    println!(
                        "{} {}",
                        "Expanded with:".dimmed(),
                        expansion.expansion_terms.join(", ").dimmed()
                    );
                }
            }
            let stages: Vec<&str> = result.stages.iter().map(|s| s.display_name()).collect();
            println!("{} {}", "Stages:".dimmed(), stages.join(" → ").dimmed());
            println!(
                "{} {} retrieved, {} used",
                "Passages:".dimmed(),
                result.documents_retrieved,
                result.documents_reranked
            );
        }

        println!(
            "{}",
            format!("Processing time: {}", format_duration(result.elapsed_ms)).dimmed()
        );
    }

    /// Show ranked passages from a retrieval-only query
    pub fn show_candidates(&mut self, candidates: &[ScoredCandidate]) {
        self.finish_spinner();

        if candidates.is_empty() {
            println!("{}", "No matching passages.".yellow());
            return;
        }

        for (i, candidate) in candidates.iter().enumerate() {
            let chunk = &candidate.chunk;
            let ranks = format!(
                "bm25 #{} | vector #{}",
                rank_label(candidate.lexical_rank),
                rank_label(candidate.semantic_rank)
            );
            println!(
                "{} {} {} {}",
                format!("{:>2}.", i + 1).bold(),
                chunk.id.cyan(),
                format!("[{}]", chunk.topic().unwrap_or("-")).green(),
                format!("score {:.4} | {}", candidate.fused_score, ranks).dimmed()
            );
            println!("    {}", chunk.source().dimmed());
            if self.verbosity.show_chrome() {
                let preview: String = chunk.text.chars().take(160).collect();
                println!("    {}", preview.replace('\n', " "));
            }
        }
    }

    pub fn show_evaluation(&self, report: &EvaluationReport) {
        for outcome in &report.queries {
            let mark = if outcome.hit { "✓".green() } else { "✗".red() };
            let label = if outcome.id.is_empty() {
                outcome.query.clone()
            } else {
                format!("{} {}", outcome.id, outcome.query)
            };
            println!(
                "{} {} {}",
                mark,
                label,
                format!("(RR {:.3})", outcome.reciprocal_rank).dimmed()
            );
        }

        println!("\n{}", format!("Hit Rate @ {}", report.top_k).bold().cyan());
        println!("  Score:             {:.3}", report.hit_rate.hit_rate);
        println!(
            "  Queries with hits: {}/{}",
            report.hit_rate.total_hits, report.hit_rate.total_queries
        );
        println!("  Queries missed:    {}", report.hit_rate.queries_missed);

        println!("\n{}", "Mean Reciprocal Rank".bold().cyan());
        println!("  Score:             {:.3}", report.mrr.mrr);
        println!("  Coverage:          {:.3}", report.mrr.coverage);
    }

    pub fn show_comparisons(&self, comparisons: &[Comparison]) {
        for comparison in comparisons {
            println!(
                "\n{}",
                format!("{} @ {}", comparison.feature, comparison.baseline.top_k)
                    .bold()
                    .cyan()
            );
            println!("  {:<10} {:>9} {:>9} {:>9}", "", "baseline", "variant", "change");
            for (metric, before, after, delta) in [
                (
                    "Hit Rate",
                    comparison.baseline.hit_rate.hit_rate,
                    comparison.variant.hit_rate.hit_rate,
                    comparison.hit_rate_delta,
                ),
                (
                    "MRR",
                    comparison.baseline.mrr.mrr,
                    comparison.variant.mrr.mrr,
                    comparison.mrr_delta,
                ),
            ] {
                let change = format!("{:>9}", format_delta(delta));
                let change = if delta > 0.0 {
                    change.green()
                } else if delta < 0.0 {
                    change.red()
                } else {
                    change.dimmed()
                };
                println!("  {:<10} {:>9.3} {:>9.3} {}", metric, before, after, change);
            }
        }
    }

    pub fn show_catalogue(&self, sources: &[String], topics: &BTreeMap<String, usize>) {
        println!("{}", format!("Sources ({})", sources.len()).bold().cyan());
        for source in sources {
            println!("  • {}", source);
        }
        println!("\n{}", "Topics".bold().cyan());
        for (topic, count) in topics {
            println!("  {:<24} {}", topic, count.to_string().dimmed());
        }
    }

    pub fn show_config(&self, config: &Config, path: Option<&std::path::Path>) {
        println!("{}", "gridtutor configuration".bold().cyan());
        match path {
            Some(p) => println!("{}", format!("  file: {}", p.display()).dimmed()),
            None => println!("{}", "  file: (built-in defaults)".dimmed()),
        }
        println!();
        println!("LLM:");
        println!("  URL:             {}", config.llm.base_url);
        println!("  Model:           {}", config.llm.model);
        println!("  Embedding model: {}", config.llm.embedding_model);
        println!("  Timeout:         {}s", config.llm.timeout_secs);
        println!();
        println!("Retrieval:");
        println!("  top_k:           {}", config.retrieval.top_k);
        println!("  BM25 k1 / b:     {} / {}", config.retrieval.bm25_k1, config.retrieval.bm25_b);
        println!("  RRF k:           {}", config.retrieval.rrf_k);
        println!("  Distance:        {:?}", config.retrieval.distance);
        println!();
        println!("Features:");
        println!("  Query expansion: {}", on_off(config.features.use_query_expansion));
        println!("  Hybrid search:   {}", on_off(config.features.use_hybrid_search));
        println!("  Reranking:       {}", on_off(config.features.use_reranking));
        println!("  Sources shown:   {}", config.features.max_sources_display);
        println!();
        println!("Corpus:            {}", config.corpus_path().display());
    }

    /// Show a failed query with guidance on stderr
    pub fn show_error(&mut self, error: &PipelineError) {
        self.finish_spinner();
        eprintln!("{} {}", "Error:".red().bold(), error_guidance(error).red());
    }

    pub fn show_warning(&self, warning: &str) {
        if self.verbosity.show_chrome() {
            eprintln!("{} {}", "Warning:".yellow().bold(), warning.yellow());
        }
    }
}

fn rank_label(rank: Option<usize>) -> String {
    rank.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}
