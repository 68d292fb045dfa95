use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Metadata for one indexed row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Absolute path of the document
    pub path: String,
    /// Raw (decoded) document content
    pub content: String,
}

/// Row-ordered document metadata; entry `i` describes vector row `i`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

/// What a catalog file records about the vector artifact it was saved with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingHeader {
    /// Embedding model that produced the paired vectors
    pub model_id: String,
    pub dimension: usize,
    /// Hex SHA-256 of the paired `vectors.idx` bytes
    pub vectors_sha256: String,
}

/// On-disk form of the catalog
#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(flatten)]
    header: PairingHeader,
    /// Row id (decimal string) -> entry
    rows: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry and return its row id
    pub fn push(&mut self, path: &Path, content: String) -> usize {
        self.entries.push(CatalogEntry {
            path: path.to_string_lossy().into_owned(),
            content,
        });
        self.entries.len() - 1
    }

    pub fn get(&self, row_id: usize) -> Option<&CatalogEntry> {
        self.entries.get(row_id)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Number of distinct paths; lower than `len()` when stale rows are present
    pub fn distinct_paths(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.path.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len()
    }

    /// Serialize to JSON under a header naming the vectors it belongs with
    pub fn to_json(&self, header: &PairingHeader) -> Result<String> {
        let file = CatalogFile {
            header: header.clone(),
            rows: self
                .entries
                .iter()
                .enumerate()
                .map(|(i, e)| (i.to_string(), e.clone()))
                .collect(),
        };
        serde_json::to_string(&file)
            .map_err(|e| Error::Snapshot(format!("Failed to serialize catalog: {}", e)))
    }

    /// Deserialize from JSON, returning the catalog with its pairing header.
    ///
    /// Row ids must be exactly `0..n`.
    pub fn from_json(json: &str) -> Result<(Self, PairingHeader)> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| Error::Snapshot(format!("Failed to deserialize catalog: {}", e)))?;

        let mut indexed: Vec<(usize, CatalogEntry)> = Vec::with_capacity(file.rows.len());
        for (key, entry) in file.rows {
            let row_id: usize = key
                .parse()
                .map_err(|_| Error::Snapshot(format!("Invalid catalog row id: {}", key)))?;
            indexed.push((row_id, entry));
        }
        indexed.sort_by_key(|(row_id, _)| *row_id);

        if indexed.iter().enumerate().any(|(pos, (row_id, _))| pos != *row_id) {
            return Err(Error::Snapshot("Catalog row ids are not dense".to_string()));
        }

        let entries = indexed.into_iter().map(|(_, e)| e).collect();
        Ok((Self { entries }, file.header))
    }
}
