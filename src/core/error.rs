use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("HuggingFace API error: {0}")]
    HuggingFace(#[from] hf_hub::api::sync::ApiError),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Watcher error: {0}")]
    Watch(String),

    #[error("Lock poisoned: {0}")]
    Lock(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Could not read file: {}", .0.display())]
    FileUnreadable(PathBuf),
}

impl Error {
    /// Errors caused by the caller's input rather than by the index itself.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Error::FileNotFound(_) | Error::FileUnreadable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
