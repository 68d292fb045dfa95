use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;
use vaultsearch::ui::cli::{Cli, Commands};
use vaultsearch::{BertEmbedder, DuplicateReport, SearchHit, SearchService};

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr, filtered by LOG_LEVEL, then RUST_LOG, then `info`
fn init_logging() {
    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level.to_lowercase()).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config().context("Invalid configuration")?;
    let json = cli.json;
    let model_id = config.model_id.clone();

    let embedder = tokio::task::spawn_blocking(move || BertEmbedder::from_hub(&model_id))
        .await?
        .context("Failed to load embedding model")?;

    let watch = matches!(cli.command, Commands::Watch);
    let mut service = SearchService::new(config, Arc::new(embedder));
    if !watch {
        service = service.without_watcher();
    }
    let service = Arc::new(service);

    match cli.command {
        Commands::Search { query, top_k } => {
            let query = Cli::query_text(&query);
            let hits = blocking(&service, move |s| s.search(&query, top_k)).await?;
            if json {
                print_json(&hits)?;
            } else {
                print_hits(&hits);
            }
        }
        Commands::Duplicates { file, threshold } => {
            let report = blocking(&service, move |s| s.find_duplicates(&file, threshold)).await?;
            if json {
                print_json(&report)?;
            } else {
                match &report {
                    DuplicateReport::Found(hits) if hits.is_empty() => {
                        println!("No duplicates found.");
                    }
                    DuplicateReport::Found(hits) => print_hits(hits),
                    DuplicateReport::Error { error } => anyhow::bail!("{}", error),
                }
            }
        }
        Commands::Reindex => {
            let report = blocking(&service, |s| s.reindex()).await?;
            if json {
                print_json(&report)?;
            } else {
                println!("✓ {} ({} files indexed)", report.message, report.indexed_files);
            }
        }
        Commands::Health => {
            let report = blocking(&service, |s| s.health()).await?;
            if json {
                print_json(&report)?;
            } else {
                println!("Status: {}", report.status);
                println!("Indexed files: {}", report.indexed_files);
                println!("Vault roots:");
                for root in &report.configured_roots {
                    println!("  {}", root);
                }
            }
        }
        Commands::Watch => {
            let report = blocking(&service, |s| s.health()).await?;
            println!(
                "Watching {} vault root(s), {} files indexed",
                report.configured_roots.len(),
                report.indexed_files
            );
            println!("Press Ctrl+C to stop watching...");

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
            blocking(&service, |s| {
                s.shutdown();
                Ok(())
            })
            .await?;
            println!("Stopped.");
        }
    }

    Ok(())
}

/// Run a service call on the blocking pool; indexing and embedding are CPU bound
async fn blocking<T, F>(service: &Arc<SearchService>, f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&SearchService) -> vaultsearch::Result<T> + Send + 'static,
{
    let service = Arc::clone(service);
    Ok(tokio::task::spawn_blocking(move || f(&service)).await??)
}

fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results found.");
        return;
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("{}. {} (score: {:.3})", i + 1, hit.path, hit.score);
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
