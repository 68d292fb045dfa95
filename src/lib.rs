// Core functionality
pub mod core {
    pub mod config;
    pub mod error;
}

// Data storage
pub mod storage {
    pub mod catalog;
    pub mod snapshot;
    pub mod vectors;
}

// Indexing pipeline
pub mod indexing {
    pub mod compose;
    pub mod discovery;
    pub mod manager;
    pub mod parser;
}

// Search & ML
pub mod search {
    pub mod model;
}

// Front ends
pub mod ui {
    pub mod cli;
    pub mod service;
    pub mod watch;
}

// Re-export commonly used types
pub use core::config::Config;
pub use core::error::{Error, Result};
pub use indexing::compose::compose_weighted_text;
pub use indexing::manager::{IndexManager, SearchHit};
pub use search::model::{BertEmbedder, Embedder};
pub use storage::catalog::{Catalog, CatalogEntry};
pub use storage::snapshot::{fingerprint, Snapshot};
pub use storage::vectors::FlatIndex;
pub use ui::cli::Cli;
pub use ui::service::{DuplicateReport, HealthReport, ReindexReport, SearchService};
pub use ui::watch::{ChangeEvent, ChangeWatcher, WatcherState};
