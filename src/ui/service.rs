use crate::core::config::Config;
use crate::core::error::Result;
use crate::indexing::manager::{IndexManager, SearchHit};
use crate::search::model::Embedder;
use crate::ui::watch::ChangeWatcher;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Default number of search results
pub const DEFAULT_TOP_K: usize = 5;

/// Outcome of a duplicate check: the matching documents, or why the check could not run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DuplicateReport {
    Found(Vec<SearchHit>),
    Error { error: String },
}

impl DuplicateReport {
    pub fn hits(&self) -> &[SearchHit] {
        match self {
            DuplicateReport::Found(hits) => hits,
            DuplicateReport::Error { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub status: String,
    pub message: String,
    pub indexed_files: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub configured_roots: Vec<String>,
    pub indexed_files: usize,
}

/// An open index together with the watcher keeping it current
struct ActiveIndex {
    manager: Arc<IndexManager>,
    watcher: Option<ChangeWatcher>,
}

impl ActiveIndex {
    fn shutdown(mut self) {
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.stop();
        }
    }
}

/// Owned entry point for front ends.
///
/// The index is opened on first use, exactly once even under concurrent first
/// callers, and its change watcher is started with it. `reindex` replaces both.
pub struct SearchService {
    config: Config,
    embedder: Arc<dyn Embedder>,
    watch_changes: bool,
    active: Mutex<Option<ActiveIndex>>,
}

impl SearchService {
    pub fn new(config: Config, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            config,
            embedder,
            watch_changes: true,
            active: Mutex::new(None),
        }
    }

    /// Do not start a change watcher (one-shot commands)
    pub fn without_watcher(mut self) -> Self {
        self.watch_changes = false;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The open index, opening it (and starting its watcher) on first use
    pub fn manager(&self) -> Result<Arc<IndexManager>> {
        let mut active = self.lock_active();
        if let Some(current) = active.as_ref() {
            return Ok(Arc::clone(&current.manager));
        }

        let opened = self.open_index(false)?;
        let manager = Arc::clone(&opened.manager);
        *active = Some(opened);
        Ok(manager)
    }

    /// Whether the index has been opened yet
    pub fn is_open(&self) -> bool {
        self.lock_active().is_some()
    }

    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        self.manager()?.search(query, top_k)
    }

    /// Near-duplicates of a document. A missing or unreadable target is
    /// reported in the result; other failures are returned as errors.
    pub fn find_duplicates(&self, path: &str, threshold: Option<f32>) -> Result<DuplicateReport> {
        let manager = self.manager()?;
        match manager.find_duplicates(Path::new(path), threshold) {
            Ok(hits) => Ok(DuplicateReport::Found(hits)),
            Err(e) if e.is_user_error() => Ok(DuplicateReport::Error {
                error: e.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Drop the current index and build a fresh one from a full scan
    pub fn reindex(&self) -> Result<ReindexReport> {
        let mut active = self.lock_active();
        info!("Forcing reindex...");

        if let Some(previous) = active.take() {
            previous.shutdown();
        }

        let opened = self.open_index(true)?;
        let indexed_files = opened.manager.len();
        *active = Some(opened);

        Ok(ReindexReport {
            status: "ok".to_string(),
            message: "Reindex complete".to_string(),
            indexed_files,
        })
    }

    pub fn health(&self) -> Result<HealthReport> {
        let manager = self.manager()?;
        Ok(HealthReport {
            status: "ok".to_string(),
            configured_roots: manager
                .roots()
                .iter()
                .map(|r| r.to_string_lossy().into_owned())
                .collect(),
            indexed_files: manager.len(),
        })
    }

    /// Stop the watcher and release the index; a later call reopens it
    pub fn shutdown(&self) {
        if let Some(previous) = self.lock_active().take() {
            previous.shutdown();
        }
    }

    fn open_index(&self, fresh: bool) -> Result<ActiveIndex> {
        let manager = if fresh {
            IndexManager::open_fresh(&self.config, Arc::clone(&self.embedder))?
        } else {
            IndexManager::open(&self.config, Arc::clone(&self.embedder))?
        };
        let manager = Arc::new(manager);

        let watcher = if self.watch_changes {
            let mut watcher = ChangeWatcher::new(Arc::clone(&manager), self.config.debounce);
            watcher.start()?;
            Some(watcher)
        } else {
            None
        };

        Ok(ActiveIndex { manager, watcher })
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveIndex>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SearchService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_report_serialization() {
        let found = DuplicateReport::Found(vec![SearchHit {
            path: "/v/a.md".to_string(),
            score: 0.9,
        }]);
        let json = serde_json::to_value(&found).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["path"], "/v/a.md");

        let failed = DuplicateReport::Error {
            error: "File not found: x.md".to_string(),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error"], "File not found: x.md");
        assert!(failed.hits().is_empty());
    }
}
