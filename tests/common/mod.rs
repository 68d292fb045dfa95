#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use vaultsearch::{Config, Embedder, Error, Result};

pub const DIMENSION: usize = 64;

/// Bag-of-words embedder: each lowercase word adds 1.0 to a hashed bucket,
/// then the vector is L2-normalized. Deterministic and needs no model files.
pub struct HashEmbedder;

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        "test/hash-bag-of-words"
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % DIMENSION as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

/// How [`FaultyEmbedder`] misbehaves on marked text
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Error,
    Panic,
}

/// Hashing embedder that fails on any text containing `marker`
pub struct FaultyEmbedder {
    pub marker: &'static str,
    pub fault: Fault,
    pub hits: AtomicUsize,
}

impl FaultyEmbedder {
    pub fn new(marker: &'static str, fault: Fault) -> Self {
        Self {
            marker,
            fault,
            hits: AtomicUsize::new(0),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Embedder for FaultyEmbedder {
    fn model_id(&self) -> &str {
        "test/hash-bag-of-words"
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains(self.marker) {
            self.hits.fetch_add(1, Ordering::SeqCst);
            match self.fault {
                Fault::Error => {
                    return Err(Error::Model(format!("cannot embed {}", self.marker)))
                }
                Fault::Panic => panic!("embedder crashed on {}", self.marker),
            }
        }
        HashEmbedder.embed(text)
    }
}

pub fn embedder() -> Arc<dyn Embedder> {
    Arc::new(HashEmbedder)
}

/// A temporary vault root plus a separate temporary snapshot directory
pub struct TestVault {
    pub root: TempDir,
    pub index: TempDir,
}

impl TestVault {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            index: TempDir::new().unwrap(),
        }
    }

    /// Canonical root path, as the index reports it
    pub fn path(&self) -> PathBuf {
        self.root.path().canonicalize().unwrap()
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn config(&self) -> Config {
        Config::new([self.root.path()]).with_index_dir(self.index.path())
    }
}

pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Poll until `condition` holds or the timeout elapses
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    condition()
}
