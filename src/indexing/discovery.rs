use ignore::WalkBuilder;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Directory name reserved for index storage inside a vault; never indexed
pub const RESERVED_DIR: &str = ".semantic-search";

/// The only extension recognized as a vault document
pub const NOTES_EXTENSION: &str = "md";

/// Check if a path names a markdown document by extension
pub fn is_notes_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == NOTES_EXTENSION)
        .unwrap_or(false)
}

/// Check if any component of the path is the reserved index directory
pub fn in_reserved_dir(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(name) if name == RESERVED_DIR))
}

/// A path is an eligible document when it is a markdown file outside the reserved directory
pub fn is_document(path: &Path) -> bool {
    is_notes_file(path) && !in_reserved_dir(path)
}

/// Discover every document under the given roots.
///
/// Roots are visited in order; inside a root entries are sorted by file name so
/// that row ids come out the same on every rebuild. Ignore files and hidden
/// entries are not honored: every markdown file in the vault is a document.
pub fn discover_documents(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for root in roots {
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(|entry| entry.file_name() != RESERVED_DIR)
            .build();

        for result in walker {
            match result {
                Ok(entry) => {
                    let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
                    if is_file && is_document(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
                Err(err) => {
                    // Some entries might be inaccessible; keep walking
                    warn!("Failed to access vault entry under {}: {}", root.display(), err);
                }
            }
        }
    }

    files
}

/// Text encodings tried, in order, when decoding a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Windows1252,
    Latin1,
}

pub const DECODING_CHAIN: [Encoding; 3] =
    [Encoding::Utf8, Encoding::Windows1252, Encoding::Latin1];

impl Encoding {
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            Encoding::Windows1252 => bytes.iter().map(|&b| windows_1252_char(b)).collect(),
            Encoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

/// Read a document and decode it with the first encoding that accepts its bytes.
///
/// Returns `None` (after logging) when the file cannot be read or decoded.
pub fn read_document(path: &Path) -> Option<String> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            return None;
        }
    };

    let decoded = DECODING_CHAIN.iter().find_map(|enc| enc.decode(&bytes));
    if decoded.is_none() {
        warn!("Could not decode {} with any encoding", path.display());
    }
    decoded
}

/// Map a Windows-1252 byte to its character; the five unassigned bytes fail
fn windows_1252_char(b: u8) -> Option<char> {
    const HIGH: [Option<char>; 32] = [
        Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
        Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
        Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
        Some('\u{0152}'), None, Some('\u{017D}'), None,
        None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
        Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
        Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
        Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
    ];
    match b {
        0x80..=0x9F => HIGH[(b - 0x80) as usize],
        _ => Some(b as char),
    }
}
