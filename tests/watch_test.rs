mod common;

use common::{embedder, wait_for, Fault, FaultyEmbedder, TestVault};
use std::sync::Arc;
use std::time::Duration;
use vaultsearch::ui::watch::apply_changes;
use vaultsearch::{ChangeEvent, ChangeWatcher, IndexManager, Result, WatcherState};

#[test]
fn test_created_and_modified_documents_are_appended() -> Result<()> {
    let vault = TestVault::new();
    vault.write("a.md", "# A");
    let manager = IndexManager::open(&vault.config(), embedder())?;
    assert_eq!(manager.len(), 1);

    let b = vault.write("b.md", "# B");
    let outcome = apply_changes(
        &manager,
        &[
            ChangeEvent::Created(b.clone()),
            ChangeEvent::Modified(b.clone()),
            ChangeEvent::Created(vault.write("skip.txt", "text")),
        ],
    )?;
    assert!(!outcome.rebuilt);
    assert_eq!(outcome.added, 1);
    assert_eq!(manager.len(), 2);

    // Editing an indexed file leaves the old row in place
    std::fs::write(&b, "# B, edited")?;
    apply_changes(&manager, &[ChangeEvent::Modified(b.clone())])?;
    assert_eq!(manager.len(), 3);

    Ok(())
}

#[test]
fn test_deleted_document_triggers_rebuild() -> Result<()> {
    let vault = TestVault::new();
    vault.write("a.md", "# A");
    let b = vault.write("b.md", "# B");
    let manager = IndexManager::open(&vault.config(), embedder())?;

    std::fs::write(&b, "# B, edited")?;
    apply_changes(&manager, &[ChangeEvent::Modified(b.clone())])?;
    assert_eq!(manager.len(), 3);

    std::fs::remove_file(&b)?;
    let c = vault.write("c.md", "# C");
    let outcome = apply_changes(
        &manager,
        &[ChangeEvent::Deleted(b), ChangeEvent::Created(c)],
    )?;
    assert!(outcome.rebuilt);
    assert_eq!(manager.len(), 2);
    assert!(manager.entries().iter().all(|e| !e.path.ends_with("b.md")));

    Ok(())
}

#[test]
fn test_deleting_a_non_document_does_not_rebuild() -> Result<()> {
    let vault = TestVault::new();
    let a = vault.write("a.md", "# A");
    let manager = IndexManager::open(&vault.config(), embedder())?;
    apply_changes(&manager, &[ChangeEvent::Modified(a)])?;
    assert_eq!(manager.len(), 2);

    let outcome = apply_changes(
        &manager,
        &[ChangeEvent::Deleted(vault.path().join(".a.md.swp"))],
    )?;
    assert!(!outcome.rebuilt);
    assert_eq!(manager.len(), 2);

    Ok(())
}

#[test]
fn test_watcher_start_and_stop() -> Result<()> {
    let vault = TestVault::new();
    let manager = Arc::new(IndexManager::open(&vault.config(), embedder())?);
    let mut watcher = ChangeWatcher::new(Arc::clone(&manager), Duration::from_millis(100));

    assert_eq!(watcher.state(), WatcherState::Stopped);
    watcher.start()?;
    watcher.start()?;
    assert_eq!(watcher.state(), WatcherState::Running);

    watcher.stop();
    assert_eq!(watcher.state(), WatcherState::Stopped);
    watcher.stop();

    Ok(())
}

#[test]
fn test_watcher_indexes_new_files() -> Result<()> {
    let vault = TestVault::new();
    vault.write("a.md", "# A");
    let config = vault.config().with_debounce(Duration::from_millis(100));
    let manager = Arc::new(IndexManager::open(&config, embedder())?);

    let mut watcher = ChangeWatcher::new(Arc::clone(&manager), config.debounce);
    watcher.start()?;
    std::thread::sleep(Duration::from_millis(200));

    vault.write("new.md", "# New note\n\nwritten while watching");
    assert!(wait_for(Duration::from_secs(10), || {
        manager.entries().iter().any(|e| e.path.ends_with("new.md"))
    }));

    watcher.stop();
    Ok(())
}

#[test]
fn test_watcher_rebuilds_after_delete() -> Result<()> {
    let vault = TestVault::new();
    vault.write("a.md", "# A");
    let doomed = vault.write("doomed.md", "# Doomed");
    let config = vault.config().with_debounce(Duration::from_millis(100));
    let manager = Arc::new(IndexManager::open(&config, embedder())?);
    assert_eq!(manager.len(), 2);

    let mut watcher = ChangeWatcher::new(Arc::clone(&manager), config.debounce);
    watcher.start()?;
    std::thread::sleep(Duration::from_millis(200));

    std::fs::remove_file(&doomed)?;
    assert!(wait_for(Duration::from_secs(10), || manager.len() == 1));
    assert!(manager.entries()[0].path.ends_with("a.md"));

    watcher.stop();
    Ok(())
}

fn watcher_survives(fault: Fault) -> Result<()> {
    let vault = TestVault::new();
    vault.write("a.md", "# A");
    let faulty = Arc::new(FaultyEmbedder::new("poison", fault));
    let config = vault.config().with_debounce(Duration::from_millis(100));
    let manager = Arc::new(IndexManager::open(&config, faulty.clone())?);

    let mut watcher = ChangeWatcher::new(Arc::clone(&manager), config.debounce);
    watcher.start()?;
    std::thread::sleep(Duration::from_millis(200));

    vault.write("poison.md", "# Poison\n\nthis note cannot be embedded");
    assert!(wait_for(Duration::from_secs(10), || faulty.hits() > 0));
    std::thread::sleep(Duration::from_millis(300));

    vault.write("good.md", "# Good\n\nwritten after the failure");
    assert!(wait_for(Duration::from_secs(10), || {
        manager.entries().iter().any(|e| e.path.ends_with("good.md"))
    }));
    assert!(manager.entries().iter().all(|e| !e.path.ends_with("poison.md")));
    assert_eq!(watcher.state(), WatcherState::Running);

    watcher.stop();
    Ok(())
}

#[test]
fn test_watcher_keeps_running_after_embed_error() -> Result<()> {
    watcher_survives(Fault::Error)
}

#[test]
fn test_watcher_keeps_running_after_handler_panic() -> Result<()> {
    watcher_survives(Fault::Panic)
}
