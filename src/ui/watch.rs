use crate::core::error::{Error, Result};
use crate::indexing::discovery::is_document;
use crate::indexing::manager::IndexManager;
use notify_debouncer_full::{
    new_debouncer,
    notify::{
        event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
        EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    },
    DebounceEventResult, DebouncedEvent, Debouncer, FileIdMap,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A filesystem change that concerns the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
}

impl ChangeEvent {
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p) | ChangeEvent::Modified(p) | ChangeEvent::Deleted(p) => p,
        }
    }
}

/// Translate a raw notification into change events.
///
/// Directory events, access events and metadata-only changes are dropped.
/// A rename becomes a deletion of the old path plus a creation of the new one.
pub fn classify(kind: &EventKind, paths: &[PathBuf]) -> Vec<ChangeEvent> {
    let files = |make: fn(PathBuf) -> ChangeEvent| -> Vec<ChangeEvent> {
        paths
            .iter()
            .filter(|p| !p.is_dir())
            .map(|p| make(p.clone()))
            .collect()
    };

    match kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => files(ChangeEvent::Created),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(mode)) => classify_rename(*mode, paths),
        EventKind::Modify(_) => files(ChangeEvent::Modified),
        EventKind::Remove(RemoveKind::Folder) => Vec::new(),
        EventKind::Remove(_) => paths.iter().cloned().map(ChangeEvent::Deleted).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn classify_rename(mode: RenameMode, paths: &[PathBuf]) -> Vec<ChangeEvent> {
    let appeared = |p: &PathBuf| (!p.is_dir()).then(|| ChangeEvent::Created(p.clone()));

    match (mode, paths) {
        (RenameMode::From, [from, ..]) => vec![ChangeEvent::Deleted(from.clone())],
        (RenameMode::To, [to, ..]) => appeared(to).into_iter().collect(),
        (RenameMode::Both, [from, to, ..]) => std::iter::once(ChangeEvent::Deleted(from.clone()))
            .chain(appeared(to))
            .collect(),
        // Direction unknown: decide by whether the path is still there
        (_, paths) => paths
            .iter()
            .filter_map(|p| {
                if p.exists() {
                    appeared(p)
                } else {
                    Some(ChangeEvent::Deleted(p.clone()))
                }
            })
            .collect(),
    }
}

/// What a batch of change events requires from the index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    /// A document disappeared; only a full rebuild can drop its row
    pub rebuild: bool,
    /// Documents to append, in first-seen order
    pub upserts: Vec<PathBuf>,
}

/// Reduce a batch of events to the work it requires. Events for paths that are
/// not eligible documents are ignored.
///
/// Only the deletion of an eligible document forces a rebuild. Deleting any
/// other file (editor swap files, `.txt`, anything under `.semantic-search`)
/// cannot have a row in the index, so it is deliberately not treated as a
/// reason to rebuild even though every non-directory delete is reported.
pub fn plan_batch(events: &[ChangeEvent]) -> BatchPlan {
    let mut plan = BatchPlan::default();
    for event in events.iter().filter(|e| is_document(e.path())) {
        match event {
            ChangeEvent::Deleted(_) => plan.rebuild = true,
            ChangeEvent::Created(path) | ChangeEvent::Modified(path) => {
                if !plan.upserts.contains(path) {
                    plan.upserts.push(path.clone());
                }
            }
        }
    }
    plan
}

/// Result of applying one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub rebuilt: bool,
    pub added: usize,
}

/// Apply a batch of change events to the index.
///
/// Any deletion triggers one full rebuild, which also picks up every other
/// change in the batch. Otherwise each created or modified document is
/// appended and the snapshot is persisted once.
pub fn apply_changes(manager: &IndexManager, events: &[ChangeEvent]) -> Result<BatchOutcome> {
    let plan = plan_batch(events);

    if plan.rebuild {
        info!("Document removed, rebuilding index...");
        let indexed = manager.rebuild()?;
        return Ok(BatchOutcome {
            rebuilt: true,
            added: indexed,
        });
    }

    let mut added = 0;
    for path in &plan.upserts {
        match manager.add_document(path) {
            Ok(true) => added += 1,
            Ok(false) => debug!("Skipped {}", path.display()),
            Err(e) => error!("Failed to index {}: {}", path.display(), e),
        }
    }
    if added > 0 {
        manager.persist()?;
    }

    Ok(BatchOutcome {
        rebuilt: false,
        added,
    })
}

/// Lifecycle of a [`ChangeWatcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Stopped,
    Running,
}

enum WatchMessage {
    Events(Vec<DebouncedEvent>),
    Errors(Vec<notify_debouncer_full::notify::Error>),
    Shutdown,
}

struct RunningWatcher {
    debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
    control: mpsc::Sender<WatchMessage>,
    worker: JoinHandle<()>,
}

/// Keeps an index in step with its vault roots.
///
/// `start` subscribes to every root recursively and spawns one background
/// thread that applies debounced change batches; `stop` unsubscribes and joins
/// it. Failures while handling a batch are logged and the watcher keeps going.
pub struct ChangeWatcher {
    manager: Arc<IndexManager>,
    debounce: Duration,
    running: Option<RunningWatcher>,
}

impl ChangeWatcher {
    /// Create a stopped watcher for an index
    pub fn new(manager: Arc<IndexManager>, debounce: Duration) -> Self {
        Self {
            manager,
            debounce,
            running: None,
        }
    }

    pub fn state(&self) -> WatcherState {
        if self.running.is_some() {
            WatcherState::Running
        } else {
            WatcherState::Stopped
        }
    }

    /// Subscribe to every root and start the background thread; no-op when running
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            debug!("Watcher already running");
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();
        let event_tx = tx.clone();

        let mut debouncer = new_debouncer(
            self.debounce,
            None,
            move |result: DebounceEventResult| {
                let message = match result {
                    Ok(events) => WatchMessage::Events(events),
                    Err(errors) => WatchMessage::Errors(errors),
                };
                let _ = event_tx.send(message);
            },
        )
        .map_err(|e| Error::Watch(format!("Failed to create file watcher: {}", e)))?;

        for root in self.manager.roots() {
            debouncer
                .watcher()
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| {
                    Error::Watch(format!("Failed to watch {}: {}", root.display(), e))
                })?;
            info!("Watching vault at {}", root.display());
        }

        let manager = Arc::clone(&self.manager);
        let worker = std::thread::Builder::new()
            .name("vault-watcher".to_string())
            .spawn(move || run_loop(manager, rx))?;

        self.running = Some(RunningWatcher {
            debouncer,
            control: tx,
            worker,
        });
        Ok(())
    }

    /// Unsubscribe and join the background thread; no-op when stopped
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        for root in self.manager.roots() {
            if let Err(e) = running.debouncer.watcher().unwatch(root) {
                debug!("Failed to unwatch {}: {}", root.display(), e);
            }
        }
        drop(running.debouncer);

        let _ = running.control.send(WatchMessage::Shutdown);
        if running.worker.join().is_err() {
            error!("Watcher thread terminated abnormally");
        }
        info!("Watcher stopped");
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(manager: Arc<IndexManager>, rx: mpsc::Receiver<WatchMessage>) {
    while let Ok(message) = rx.recv() {
        match message {
            WatchMessage::Events(batch) => {
                let events: Vec<ChangeEvent> = batch
                    .iter()
                    .flat_map(|e| classify(&e.kind, &e.paths))
                    .collect();
                if events.is_empty() {
                    continue;
                }

                match catch_unwind(AssertUnwindSafe(|| apply_changes(&manager, &events))) {
                    Ok(Ok(outcome)) => debug!("Applied change batch: {:?}", outcome),
                    Ok(Err(e)) => error!("Failed to apply file changes: {}", e),
                    Err(_) => error!("Panic while applying file changes; watcher continues"),
                }
            }
            WatchMessage::Errors(errors) => {
                for e in errors {
                    warn!("File watcher error: {}", e);
                }
            }
            WatchMessage::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_basic_kinds() {
        let path = vec![PathBuf::from("/nonexistent/vault/a.md")];
        assert_eq!(
            classify(&EventKind::Create(CreateKind::File), &path),
            vec![ChangeEvent::Created(path[0].clone())]
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Any), &path),
            vec![ChangeEvent::Modified(path[0].clone())]
        );
        assert_eq!(
            classify(&EventKind::Remove(RemoveKind::File), &path),
            vec![ChangeEvent::Deleted(path[0].clone())]
        );
        assert!(classify(&EventKind::Remove(RemoveKind::Folder), &path).is_empty());
        assert!(classify(&EventKind::Create(CreateKind::Folder), &path).is_empty());
        assert!(classify(
            &EventKind::Modify(ModifyKind::Metadata(
                notify_debouncer_full::notify::event::MetadataKind::Any
            )),
            &path
        )
        .is_empty());
    }

    #[test]
    fn test_classify_ignores_existing_directories() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = vec![temp.path().to_path_buf()];
        assert!(classify(&EventKind::Create(CreateKind::Any), &dir).is_empty());
        assert!(classify(&EventKind::Modify(ModifyKind::Any), &dir).is_empty());
    }

    #[test]
    fn test_classify_rename_both() {
        let paths = vec![
            PathBuf::from("/nonexistent/old.md"),
            PathBuf::from("/nonexistent/new.md"),
        ];
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Name(RenameMode::Both)), &paths),
            vec![
                ChangeEvent::Deleted(paths[0].clone()),
                ChangeEvent::Created(paths[1].clone()),
            ]
        );
    }

    #[test]
    fn test_plan_batch() {
        let events = vec![
            ChangeEvent::Created(PathBuf::from("/v/a.md")),
            ChangeEvent::Modified(PathBuf::from("/v/a.md")),
            ChangeEvent::Modified(PathBuf::from("/v/b.txt")),
            ChangeEvent::Created(PathBuf::from("/v/.semantic-search/c.md")),
        ];
        let plan = plan_batch(&events);
        assert!(!plan.rebuild);
        assert_eq!(plan.upserts, vec![PathBuf::from("/v/a.md")]);

        let plan = plan_batch(&[ChangeEvent::Deleted(PathBuf::from("/v/a.md"))]);
        assert!(plan.rebuild);

        let plan = plan_batch(&[ChangeEvent::Deleted(PathBuf::from("/v/a.txt"))]);
        assert!(!plan.rebuild);
    }
}
