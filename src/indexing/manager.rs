use crate::core::config::{expand_tilde, Config};
use crate::core::error::{Error, Result};
use crate::indexing::compose::compose_weighted_text;
use crate::indexing::discovery::{discover_documents, is_notes_file, read_document};
use crate::search::model::Embedder;
use crate::storage::catalog::{Catalog, CatalogEntry};
use crate::storage::snapshot::Snapshot;
use crate::storage::vectors::FlatIndex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info, warn};

/// Number of documents embedded per batch during a rebuild
const EMBED_BATCH_SIZE: usize = 32;

/// Progress is logged every this many indexed documents
const PROGRESS_EVERY: usize = 100;

/// A search or duplicate-detection result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub score: f32,
}

/// Catalog and vector store, always replaced or appended together
struct IndexState {
    catalog: Catalog,
    store: FlatIndex,
}

impl IndexState {
    fn empty(dimension: usize) -> Self {
        Self {
            catalog: Catalog::new(),
            store: FlatIndex::new(dimension),
        }
    }

    /// Append one document; the catalog entry is only written once the vector is stored
    fn append(&mut self, path: &Path, content: String, vector: &[f32]) -> Result<usize> {
        self.store.add(vector)?;
        Ok(self.catalog.push(path, content))
    }
}

/// A document read and composed, waiting to be embedded
struct PreparedDocument {
    path: PathBuf,
    content: String,
    text: String,
}

/// Owns the catalog/vector-store pair for one vault configuration.
///
/// Readers take the state read lock only. Mutations (rebuild, add, persist) are
/// serialized by the writer lock so that row ids are unique and a rebuild is
/// swapped in whole; a concurrent search sees either the old or the new index.
pub struct IndexManager {
    roots: Vec<PathBuf>,
    duplicate_threshold: f32,
    snapshot: Snapshot,
    embedder: Arc<dyn Embedder>,
    state: RwLock<IndexState>,
    writer: Mutex<()>,
}

impl IndexManager {
    /// Open the index for the configured roots, loading the snapshot when a
    /// usable one exists and rebuilding otherwise.
    pub fn open(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let manager = Self::new_empty(config, embedder)?;

        let loaded = if config.reuse_snapshot {
            manager
                .snapshot
                .load(manager.embedder.model_id(), manager.embedder.dimension())?
        } else {
            None
        };

        match loaded {
            Some((catalog, store)) => {
                info!("Loaded index with {} entries", catalog.len());
                *manager.write_state() = IndexState { catalog, store };
            }
            None => {
                info!("No existing index found. Building initial index...");
                manager.rebuild()?;
            }
        }

        Ok(manager)
    }

    /// Open the index and always rebuild it from a fresh scan
    pub fn open_fresh(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Self::open(&config.clone().with_reuse_snapshot(false), embedder)
    }

    fn new_empty(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let roots = config.resolved_roots()?;
        let snapshot = Snapshot::for_roots(&config.index_dir, &roots);
        let dimension = embedder.dimension();

        Ok(Self {
            roots,
            duplicate_threshold: config.duplicate_threshold,
            snapshot,
            embedder,
            state: RwLock::new(IndexState::empty(dimension)),
            writer: Mutex::new(()),
        })
    }

    /// Resolved vault roots, in configured order
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn duplicate_threshold(&self) -> f32 {
        self.duplicate_threshold
    }

    pub fn snapshot_dir(&self) -> &Path {
        self.snapshot.dir()
    }

    /// Number of rows (stale rows for re-added documents included)
    pub fn len(&self) -> usize {
        self.read_state().catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all catalog entries in row order
    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.read_state().catalog.entries().to_vec()
    }

    /// Vector stored at a row
    pub fn vector(&self, row_id: usize) -> Option<Vec<f32>> {
        self.read_state().store.row(row_id).map(<[f32]>::to_vec)
    }

    /// Discard the index and rebuild it from every document under the roots.
    ///
    /// Documents that cannot be read, decoded or embedded are logged and
    /// skipped. Returns the number of indexed documents.
    pub fn rebuild(&self) -> Result<usize> {
        let _writer = self.lock_writer();

        let files = discover_documents(&self.roots);
        info!("Rebuilding index from {} documents", files.len());

        let prepared: Vec<PreparedDocument> = files
            .par_iter()
            .map(|path| {
                read_document(path).map(|content| PreparedDocument {
                    text: compose_weighted_text(path, &content),
                    path: path.clone(),
                    content,
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();

        let mut next = IndexState::empty(self.embedder.dimension());
        for batch in prepared.chunks(EMBED_BATCH_SIZE) {
            for (doc, vector) in batch.iter().zip(self.embed_prepared(batch)) {
                let Some(vector) = vector else { continue };
                match next.append(&doc.path, doc.content.clone(), &vector) {
                    Ok(row) if (row + 1) % PROGRESS_EVERY == 0 => {
                        info!("Indexed {} files...", row + 1);
                    }
                    Ok(_) => {}
                    Err(e) => error!("Failed to index {}: {}", doc.path.display(), e),
                }
            }
        }

        let indexed = next.catalog.len();
        *self.write_state() = next;
        self.persist_locked()?;

        info!("Rebuilt index with {} files", indexed);
        Ok(indexed)
    }

    /// Embed a batch, falling back to one-by-one so a single failure only skips its own document
    fn embed_prepared(&self, batch: &[PreparedDocument]) -> Vec<Option<Vec<f32>>> {
        let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
        match self.embedder.embed_batch(&texts) {
            Ok(vectors) if vectors.len() == batch.len() => vectors.into_iter().map(Some).collect(),
            _ => batch
                .iter()
                .map(|doc| match self.embedder.embed(&doc.text) {
                    Ok(vector) => Some(vector),
                    Err(e) => {
                        error!("Failed to index {}: {}", doc.path.display(), e);
                        None
                    }
                })
                .collect(),
        }
    }

    /// Append one document as a new row.
    ///
    /// Does nothing (returns `false`) when the path is missing, is not a
    /// markdown file, or cannot be decoded. A path that is already indexed gets
    /// an additional row; the earlier row stays until the next rebuild.
    pub fn add_document(&self, path: &Path) -> Result<bool> {
        if !path.is_file() || !is_notes_file(path) {
            return Ok(false);
        }
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let Some(content) = read_document(&path) else {
            return Ok(false);
        };

        let vector = self.embedder.embed(&compose_weighted_text(&path, &content))?;

        let _writer = self.lock_writer();
        let row = self.write_state().append(&path, content, &vector)?;
        info!("Indexed {} as row {}", path.display(), row);
        Ok(true)
    }

    /// Write the current catalog and vector store to the snapshot directory
    pub fn persist(&self) -> Result<()> {
        let _writer = self.lock_writer();
        self.persist_locked()
    }

    fn persist_locked(&self) -> Result<()> {
        let state = self.read_state();
        self.snapshot
            .save(&state.catalog, &state.store, self.embedder.model_id())
    }

    /// Nearest documents to a free-text query, best first
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query)?;
        let state = self.read_state();
        let k = top_k.min(state.catalog.len());
        let neighbors = state.store.search(&vector, k)?;

        Ok(neighbors
            .into_iter()
            .filter_map(|n| {
                state.catalog.get(n.row_id).map(|entry| SearchHit {
                    path: entry.path.clone(),
                    score: n.score,
                })
            })
            .collect())
    }

    /// Documents whose similarity to the given file is strictly above the threshold.
    ///
    /// Relative paths are tried against each root in order. The file itself is
    /// never reported. Fails with `FileNotFound` or `FileUnreadable`.
    pub fn find_duplicates(&self, path: &Path, threshold: Option<f32>) -> Result<Vec<SearchHit>> {
        let threshold = threshold.unwrap_or(self.duplicate_threshold);
        let resolved = self.resolve_document_path(path)?;
        let content =
            read_document(&resolved).ok_or_else(|| Error::FileUnreadable(resolved.clone()))?;

        if self.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed(&compose_weighted_text(&resolved, &content))?;
        let query_key = canonical_or_self(&resolved);

        let state = self.read_state();
        let neighbors = state.store.search(&vector, state.catalog.len())?;

        Ok(neighbors
            .into_iter()
            .filter(|n| n.score > threshold)
            .filter_map(|n| state.catalog.get(n.row_id).map(|entry| (n.score, entry)))
            .filter(|(_, entry)| canonical_or_self(Path::new(&entry.path)) != query_key)
            .map(|(score, entry)| SearchHit {
                path: entry.path.clone(),
                score,
            })
            .collect())
    }

    /// Resolve a user-supplied path: absolute paths as-is, relative paths
    /// against each root in order (first existing file wins)
    pub fn resolve_document_path(&self, path: &Path) -> Result<PathBuf> {
        let path = expand_tilde(&path.to_string_lossy());

        if path.is_absolute() {
            return if path.exists() {
                Ok(path)
            } else {
                Err(Error::FileNotFound(path))
            };
        }

        for root in &self.roots {
            let candidate = root.join(&path);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(Error::FileNotFound(path))
    }

    fn read_state(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|e| {
            warn!("Index writer lock was poisoned; continuing");
            e.into_inner()
        })
    }
}

fn canonical_or_self(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
