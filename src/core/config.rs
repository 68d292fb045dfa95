use super::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the vault when `CONTENT_PATH` is not set
pub const DEFAULT_CONTENT_PATH: &str = "./content";

/// Default embedding model (small BERT sentence encoder)
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Minimum similarity (exclusive) for a hit to count as a near-duplicate
pub const DEFAULT_DUPLICATE_THRESHOLD: f32 = 0.85;

/// Configuration for vaultsearch
#[derive(Debug, Clone)]
pub struct Config {
    /// Vault roots as configured (not yet expanded or resolved)
    pub roots: Vec<PathBuf>,
    /// Directory under which per-vault snapshots are stored
    pub index_dir: PathBuf,
    /// HuggingFace model id used for embeddings
    pub model_id: String,
    /// Default threshold for duplicate detection
    pub duplicate_threshold: f32,
    /// Quiet period before a burst of filesystem events is dispatched
    pub debounce: Duration,
    /// Load an existing snapshot instead of rebuilding on open
    pub reuse_snapshot: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(DEFAULT_CONTENT_PATH)],
            index_dir: Self::default_index_dir(),
            model_id: DEFAULT_MODEL.to_string(),
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            debounce: Duration::from_secs(2),
            reuse_snapshot: true,
        }
    }
}

impl Config {
    /// Get the default snapshot directory
    pub fn default_index_dir() -> PathBuf {
        std::env::temp_dir().join("semantic-search")
    }

    /// Create a configuration for the given vault roots
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Build a configuration from the process environment.
    ///
    /// `CONTENT_PATH` holds comma-separated vault roots. `SEMANTIC_SEARCH_INDEX_DIR`,
    /// `SEMANTIC_SEARCH_MODEL` and `SEMANTIC_SEARCH_THRESHOLD` override the defaults.
    pub fn from_env() -> Result<Self> {
        let raw_paths = std::env::var("CONTENT_PATH").ok();
        let mut config = Self::new(parse_content_paths(raw_paths.as_deref()));

        if let Ok(dir) = std::env::var("SEMANTIC_SEARCH_INDEX_DIR") {
            if !dir.trim().is_empty() {
                config.index_dir = expand_tilde(dir.trim());
            }
        }
        if let Ok(model) = std::env::var("SEMANTIC_SEARCH_MODEL") {
            if !model.trim().is_empty() {
                config.model_id = model.trim().to_string();
            }
        }
        if let Ok(raw) = std::env::var("SEMANTIC_SEARCH_THRESHOLD") {
            config.duplicate_threshold = raw.trim().parse().map_err(|_| {
                Error::Config(format!("SEMANTIC_SEARCH_THRESHOLD is not a number: {}", raw))
            })?;
        }

        Ok(config)
    }

    pub fn with_index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.index_dir = dir.into();
        self
    }

    pub fn with_duplicate_threshold(mut self, threshold: f32) -> Self {
        self.duplicate_threshold = threshold;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_reuse_snapshot(mut self, reuse: bool) -> Self {
        self.reuse_snapshot = reuse;
        self
    }

    /// Expand, resolve and validate the configured roots.
    ///
    /// Order is preserved and repeated roots are dropped. Fails when no root is
    /// configured or when a root is not an existing directory.
    pub fn resolved_roots(&self) -> Result<Vec<PathBuf>> {
        if self.roots.is_empty() {
            return Err(Error::Config("No vault roots configured".to_string()));
        }

        let mut resolved: Vec<PathBuf> = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            let expanded = expand_tilde(&root.to_string_lossy());
            if !expanded.exists() {
                return Err(Error::Config(format!(
                    "Directory does not exist: {}",
                    expanded.display()
                )));
            }
            if !expanded.is_dir() {
                return Err(Error::Config(format!(
                    "Path is not a directory: {}",
                    expanded.display()
                )));
            }
            let canonical = expanded.canonicalize()?;
            if !resolved.contains(&canonical) {
                resolved.push(canonical);
            }
        }

        Ok(resolved)
    }
}

/// Split a comma-separated `CONTENT_PATH` value into trimmed, non-empty entries.
pub fn parse_content_paths(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or(DEFAULT_CONTENT_PATH)
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Expand a leading `~` to the user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    Path::new(path).to_path_buf()
}
