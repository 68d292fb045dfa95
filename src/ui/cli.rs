use crate::core::config::{expand_tilde, parse_content_paths, Config};
use crate::core::error::Result;
use crate::ui::service::DEFAULT_TOP_K;
use clap::{Parser, Subcommand};

/// vaultsearch - Semantic search and duplicate detection for markdown vaults
#[derive(Parser, Debug)]
#[command(name = "vaultsearch")]
#[command(about = "Semantic search and near-duplicate detection over markdown vaults", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Vault roots, comma separated (default: $CONTENT_PATH or ./content)
    #[arg(long, global = true, value_name = "PATHS")]
    pub content_path: Option<String>,

    /// Directory holding index snapshots (default: <tmp>/semantic-search)
    #[arg(long, global = true, value_name = "DIR")]
    pub index_dir: Option<String>,

    /// HuggingFace embedding model id
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Ignore any saved snapshot and rebuild the index
    #[arg(long, global = true)]
    pub fresh: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search notes by meaning
    Search {
        /// Search query
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Maximum number of results to return
        #[arg(short = 'n', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// List notes that are near-duplicates of a file
    Duplicates {
        /// Path to the note, absolute or relative to a vault root
        file: String,
        /// Similarity a match must exceed (default: 0.85)
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Rebuild the index from scratch
    Reindex,
    /// Show index status
    Health,
    /// Keep the index up to date until interrupted
    Watch,
}

impl Cli {
    /// Environment configuration with command-line overrides applied
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::from_env()?;

        if let Some(raw) = &self.content_path {
            config.roots = parse_content_paths(Some(raw))
                .into_iter()
                .map(Into::into)
                .collect();
        }
        if let Some(dir) = &self.index_dir {
            config.index_dir = expand_tilde(dir);
        }
        if let Some(model) = &self.model {
            config.model_id = model.clone();
        }
        if self.fresh {
            config.reuse_snapshot = false;
        }

        Ok(config)
    }

    /// The search query as one string
    pub fn query_text(query: &[String]) -> String {
        query.join(" ")
    }
}
