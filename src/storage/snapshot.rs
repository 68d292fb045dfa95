use super::catalog::{Catalog, PairingHeader};
use super::vectors::FlatIndex;
use crate::core::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const VECTORS_FILE: &str = "vectors.idx";
pub const CATALOG_FILE: &str = "catalog.json";

/// Length of the hex fingerprint used as the snapshot directory name
const FINGERPRINT_LEN: usize = 16;

/// Hex SHA-256 of a byte artifact
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Fingerprint of a vault configuration: sorted, de-duplicated resolved roots
pub fn fingerprint(roots: &[PathBuf]) -> String {
    let mut sorted: Vec<String> = roots.iter().map(|p| p.to_string_lossy().into_owned()).collect();
    sorted.sort();
    sorted.dedup();

    let mut hasher = Sha256::new();
    hasher.update(sorted.join(",").as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

/// Persisted (vector store, catalog) pair for one vault configuration
#[derive(Debug, Clone)]
pub struct Snapshot {
    dir: PathBuf,
}

impl Snapshot {
    /// Snapshot location for the given roots under a base directory
    pub fn for_roots(base_dir: &Path, roots: &[PathBuf]) -> Self {
        Self {
            dir: base_dir.join(fingerprint(roots)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.dir.join(CATALOG_FILE)
    }

    /// Both halves exist on disk
    pub fn exists(&self) -> bool {
        self.vectors_path().is_file() && self.catalog_path().is_file()
    }

    /// Write both halves. Each file is written to a temporary sibling and renamed
    /// into place. The catalog records the digest of the vectors it was saved
    /// with, so a catalog left over from an interrupted save is rejected on load.
    pub fn save(&self, catalog: &Catalog, store: &FlatIndex, model_id: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let vectors = store.to_bytes();
        let catalog_json = catalog.to_json(&PairingHeader {
            model_id: model_id.to_string(),
            dimension: store.dimension(),
            vectors_sha256: sha256_hex(&vectors),
        })?;

        write_atomic(&self.vectors_path(), &vectors)?;
        write_atomic(&self.catalog_path(), catalog_json.as_bytes())?;

        info!("Index saved to {} ({} rows)", self.dir.display(), catalog.len());
        Ok(())
    }

    /// Load both halves.
    ///
    /// Returns `Ok(None)` when the snapshot is absent, partial, corrupt,
    /// inconsistent, or was produced by a different model; the caller rebuilds.
    pub fn load(&self, model_id: &str, dimension: usize) -> Result<Option<(Catalog, FlatIndex)>> {
        if !self.exists() {
            return Ok(None);
        }

        match self.try_load(model_id, dimension) {
            Ok(pair) => Ok(Some(pair)),
            Err(e) => {
                warn!("Discarding snapshot at {}: {}", self.dir.display(), e);
                Ok(None)
            }
        }
    }

    fn try_load(&self, model_id: &str, dimension: usize) -> Result<(Catalog, FlatIndex)> {
        let vectors = std::fs::read(self.vectors_path())?;
        let json = std::fs::read_to_string(self.catalog_path())?;
        let (catalog, header) = Catalog::from_json(&json)?;

        if header.vectors_sha256 != sha256_hex(&vectors) {
            return Err(Error::Snapshot(
                "catalog was saved with a different vector artifact".to_string(),
            ));
        }
        let store = FlatIndex::from_bytes(&vectors)?;

        if header.model_id != model_id {
            return Err(Error::Snapshot(format!(
                "built with model {}, current model is {}",
                header.model_id, model_id
            )));
        }
        if header.dimension != dimension || store.dimension() != dimension {
            return Err(Error::Dimension {
                expected: dimension,
                actual: store.dimension(),
            });
        }
        if catalog.len() != store.len() {
            return Err(Error::Snapshot(format!(
                "catalog has {} rows but vector store has {}",
                catalog.len(),
                store.len()
            )));
        }

        Ok((catalog, store))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Catalog, FlatIndex) {
        let mut catalog = Catalog::new();
        let mut store = FlatIndex::new(2);
        catalog.push(Path::new("/v/a.md"), "alpha".into());
        store.add(&[1.0, 0.0]).unwrap();
        (catalog, store)
    }

    #[test]
    fn test_fingerprint_distinguishes_configurations() {
        let a = vec![PathBuf::from("/vault0")];
        let ab = vec![PathBuf::from("/vault0"), PathBuf::from("/vault1")];
        let ba = vec![PathBuf::from("/vault1"), PathBuf::from("/vault0")];
        assert_ne!(fingerprint(&a), fingerprint(&ab));
        assert_eq!(fingerprint(&ab), fingerprint(&ba));
        assert_eq!(fingerprint(&a).len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_save_and_load() {
        let temp = tempfile::TempDir::new().unwrap();
        let snapshot = Snapshot::for_roots(temp.path(), &[PathBuf::from("/v")]);
        let (catalog, store) = sample();

        assert!(snapshot.load("m", 2).unwrap().is_none());
        snapshot.save(&catalog, &store, "m").unwrap();
        assert!(snapshot.exists());

        let (loaded_catalog, loaded_store) = snapshot.load("m", 2).unwrap().unwrap();
        assert_eq!(loaded_catalog, catalog);
        assert_eq!(loaded_store, store);
    }

    #[test]
    fn test_partial_or_foreign_snapshot_is_absent() {
        let temp = tempfile::TempDir::new().unwrap();
        let snapshot = Snapshot::for_roots(temp.path(), &[PathBuf::from("/v")]);
        let (catalog, store) = sample();
        snapshot.save(&catalog, &store, "m").unwrap();

        assert!(snapshot.load("other-model", 2).unwrap().is_none());
        assert!(snapshot.load("m", 3).unwrap().is_none());

        std::fs::write(snapshot.catalog_path(), "{not json").unwrap();
        assert!(snapshot.load("m", 2).unwrap().is_none());

        std::fs::remove_file(snapshot.catalog_path()).unwrap();
        assert!(!snapshot.exists());
        assert!(snapshot.load("m", 2).unwrap().is_none());
    }

    #[test]
    fn test_vectors_from_another_save_are_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let snapshot = Snapshot::for_roots(temp.path(), &[PathBuf::from("/v")]);
        let (catalog, store) = sample();
        snapshot.save(&catalog, &store, "m").unwrap();

        let mut other = FlatIndex::new(2);
        other.add(&[0.0, 1.0]).unwrap();
        std::fs::write(snapshot.vectors_path(), other.to_bytes()).unwrap();

        assert!(snapshot.load("m", 2).unwrap().is_none());
    }
}
