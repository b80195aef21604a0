//! Command-line argument parsing for gridtutor
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::rag::pipeline::QueryOptions;
use crate::rag::retrieval::Filter;

/// gridtutor - Ask grounded questions about power systems and renewable energy
#[derive(Parser, Debug)]
#[command(name = "gridtutor")]
#[command(version)]
#[command(about = "Domain-restricted question answering over a power systems corpus", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Corpus file (overrides the configured path)
    #[arg(long, global = true)]
    pub corpus: Option<PathBuf>,

    /// Completion model (overrides the configured model)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress everything except the answer)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Retrieval switches shared by `ask` and `retrieve`
#[derive(clap::Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Restrict to chunks with this topic
    #[arg(long)]
    pub topic: Option<String>,

    /// Exact metadata match, repeatable (e.g. --filter source=ieee.pdf)
    #[arg(long = "filter", value_name = "FIELD=VALUE", value_parser = parse_filter_pair)]
    pub filters: Vec<(String, String)>,

    /// Number of passages to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Skip query expansion
    #[arg(long)]
    pub no_expansion: bool,

    /// Semantic search only (no BM25)
    #[arg(long)]
    pub no_hybrid: bool,

    /// Skip model reranking
    #[arg(long)]
    pub no_rerank: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a question and get a grounded answer
    Ask {
        /// The question
        #[arg(value_name = "QUESTION")]
        question: String,

        #[command(flatten)]
        query: QueryArgs,

        /// Do not list sources
        #[arg(long)]
        no_sources: bool,
    },

    /// Show the ranked passages for a query without generating an answer
    Retrieve {
        #[arg(value_name = "QUERY")]
        query: String,

        #[command(flatten)]
        options: QueryArgs,
    },

    /// Measure hit rate and MRR over a labelled query set
    Evaluate {
        /// JSON dataset with queries and expected topics
        #[arg(long)]
        dataset: PathBuf,

        /// Results considered per query
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Write the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report reranking off vs on and semantic-only vs hybrid
        #[arg(long)]
        compare: bool,
    },

    /// List corpus sources and topic counts
    Sources,

    /// Display current configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

fn parse_filter_pair(pair: &str) -> Result<(String, String), String> {
    Filter::parse_pair(pair).ok_or_else(|| format!("expected FIELD=VALUE, got '{}'", pair))
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl QueryArgs {
    /// Combined metadata filter, `None` when no filter was given
    pub fn filter(&self) -> Option<Filter> {
        let mut pairs = self.filters.clone();
        if let Some(topic) = &self.topic {
            pairs.push(("topic".to_string(), topic.clone()));
        }
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.into_iter().collect())
        }
    }

    /// Apply the switches on top of configured defaults
    pub fn apply(&self, mut options: QueryOptions) -> QueryOptions {
        options.filters = self.filter();
        if let Some(top_k) = self.top_k {
            options.top_k = top_k;
        }
        if self.no_expansion {
            options.use_expansion = false;
        }
        if self.no_hybrid {
            options.use_hybrid = false;
        }
        if self.no_rerank {
            options.use_rerank = false;
        }
        options
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Check if should show the query trace (stages, timing)
    pub fn show_trace(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }

    /// Check if should show headers and decorations
    pub fn show_chrome(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(parse(&["gridtutor", "-q", "sources"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["gridtutor", "sources"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["gridtutor", "-v", "sources"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["gridtutor", "sources", "-vv"]).verbosity(), Verbosity::VeryVerbose);
    }

    #[test]
    fn test_ask_with_filters() {
        let args = parse(&[
            "gridtutor",
            "ask",
            "What limits wind farm output?",
            "--topic",
            "wind",
            "--filter",
            "source=iea.pdf",
            "-k",
            "8",
            "--no-rerank",
        ]);

        let Commands::Ask { question, query, no_sources } = args.command else {
            panic!("expected ask");
        };
        assert_eq!(question, "What limits wind farm output?");
        assert!(!no_sources);

        let filter = query.filter().unwrap();
        assert_eq!(filter.len(), 2);
        assert_eq!(filter, Filter::new().with("topic", "wind").with("source", "iea.pdf"));

        let options = query.apply(QueryOptions::default());
        assert_eq!(options.top_k, 8);
        assert!(!options.use_rerank);
        assert!(options.use_expansion);
        assert!(options.use_hybrid);
    }

    #[test]
    fn test_no_filter_is_none() {
        assert!(QueryArgs::default().filter().is_none());
    }

    #[test]
    fn test_bad_filter_rejected() {
        assert!(Args::try_parse_from(["gridtutor", "retrieve", "q", "--filter", "topic"]).is_err());
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Args::try_parse_from(["gridtutor"]).is_err());
    }

    #[test]
    fn test_evaluate_args() {
        let args = parse(&["gridtutor", "evaluate", "--dataset", "queries.json", "-o", "out.json"]);
        match args.command {
            Commands::Evaluate {
                dataset,
                top_k,
                output,
                compare,
            } => {
                assert_eq!(dataset, PathBuf::from("queries.json"));
                assert!(top_k.is_none());
                assert_eq!(output, Some(PathBuf::from("out.json")));
                assert!(!compare);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_evaluate_compare() {
        let args = parse(&["gridtutor", "evaluate", "--dataset", "queries.json", "--compare", "-k", "3"]);
        match args.command {
            Commands::Evaluate { top_k, compare, .. } => {
                assert_eq!(top_k, Some(3));
                assert!(compare);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_verbosity_methods() {
        assert!(!Verbosity::Quiet.show_chrome());
        assert!(Verbosity::Normal.show_chrome());
        assert!(!Verbosity::Normal.show_trace());
        assert!(Verbosity::Verbose.show_trace());
    }
}
