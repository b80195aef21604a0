//! gridtutor - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;

use gridtutor::{
    cli::{display::DisplayManager, Args, Commands},
    config::Config,
    evaluation::{self, EvalDataset},
    llm::OllamaClient,
    logging,
    rag::RAGPipeline,
    store::InMemoryStore,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    logging::init(args.verbosity());

    let mut config = Config::load(args.config.clone()).context("Failed to load configuration")?;
    if let Some(model) = &args.model {
        config.llm.model = model.clone();
    }
    if let Some(corpus) = &args.corpus {
        config.corpus.path = corpus.display().to_string();
    }

    let mut display = DisplayManager::new(args.verbosity());

    match &args.command {
        Commands::Ask {
            question,
            query,
            no_sources,
        } => {
            let pipeline = build_pipeline(config).await?;
            let mut options = query.apply(pipeline.default_options());
            if *no_sources {
                options.with_sources = false;
            }

            display.start_spinner("Searching the knowledge base...");
            match pipeline.execute(question, &options).await {
                Ok(result) => {
                    let max_sources = if options.with_sources {
                        pipeline.config().features.max_sources_display
                    } else {
                        0
                    };
                    display.show_answer(&result, max_sources);
                }
                Err(e) => {
                    display.show_error(&e);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Retrieve { query, options } => {
            let pipeline = build_pipeline(config).await?;
            let options = options.apply(pipeline.default_options());
            if options.use_expansion || options.use_rerank {
                display.show_warning("retrieve shows fused candidates; expansion and reranking are not applied");
            }
            let params = gridtutor::rag::SearchParams {
                top_k: options.top_k,
                filters: options.filters,
                hybrid: options.use_hybrid,
            };

            display.start_spinner("Retrieving...");
            match pipeline.retrieve_with_params(query, &params).await {
                Ok(candidates) => display.show_candidates(&candidates),
                Err(e) => {
                    display.show_error(&e);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Evaluate {
            dataset,
            top_k,
            output,
            compare,
        } => {
            let dataset = EvalDataset::load(dataset)?;
            let pipeline = build_pipeline(config).await?;
            let top_k = top_k.unwrap_or(pipeline.config().retrieval.top_k);

            display.start_spinner(&format!("Evaluating {} queries...", dataset.len()));
            let json = if *compare {
                let comparisons = match evaluation::compare_features(&pipeline, &dataset, top_k).await {
                    Ok(comparisons) => comparisons,
                    Err(e) => {
                        display.show_error(&e);
                        return Ok(ExitCode::FAILURE);
                    }
                };
                display.finish_spinner();
                display.show_comparisons(&comparisons);
                serde_json::to_string_pretty(&comparisons)?
            } else {
                let report = match evaluation::evaluate(&pipeline, &dataset, top_k).await {
                    Ok(report) => report,
                    Err(e) => {
                        display.show_error(&e);
                        return Ok(ExitCode::FAILURE);
                    }
                };
                display.finish_spinner();
                display.show_evaluation(&report);
                serde_json::to_string_pretty(&report)?
            };

            if let Some(path) = output {
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                println!("\n{} {}", "Report saved to".dimmed(), path.display());
            }
        }
        Commands::Sources => {
            let store = load_store(&config)?;
            display.show_catalogue(&store.available_sources(), &store.topic_distribution());
        }
        Commands::Config { init } => {
            let path = args.config.clone().or_else(Config::default_path);
            if *init {
                let path = path.context("Could not determine a config file location")?;
                config.save(&path)?;
                println!("{} {}", "Wrote".green(), path.display());
            } else {
                display.show_config(&config, path.as_deref().filter(|p| p.exists()));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_store(config: &Config) -> Result<InMemoryStore> {
    let path = config.corpus_path();
    InMemoryStore::load(&path, config.retrieval.distance)
        .with_context(|| format!("Failed to load corpus from {}", path.display()))
}

async fn build_pipeline(config: Config) -> Result<RAGPipeline> {
    let store = load_store(&config)?;
    let client = Arc::new(OllamaClient::with_config(&config.llm).context("Failed to create model client")?);
    if !client.health_check().await {
        tracing::warn!(url = client.base_url(), "Ollama is not reachable; queries will fail");
    }

    let pipeline = RAGPipeline::new(Arc::new(store), client.clone(), client, config)
        .await
        .context("Failed to initialise pipeline")?;
    Ok(pipeline)
}
