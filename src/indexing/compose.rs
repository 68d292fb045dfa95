//! Weighted text composition.
//!
//! The embedding of a document is biased toward its name, title, tags and main
//! heading by repeating those parts ahead of the body.

use super::parser::{extract_inline_tags, first_heading, parse_document};
use std::collections::HashSet;
use std::path::Path;

pub const FILENAME_WEIGHT: usize = 3;
pub const TITLE_WEIGHT: usize = 3;
pub const TAGS_WEIGHT: usize = 2;
pub const HEADING_WEIGHT: usize = 2;

/// Number of whitespace-separated body tokens kept
pub const BODY_TOKEN_LIMIT: usize = 500;

/// Compose the text that gets embedded for a document.
///
/// Lines, in order: file stem (separators as spaces) x3, frontmatter title x3,
/// tags and aliases x2, first `# ` heading x2, leading body tokens x1.
pub fn compose_weighted_text(path: &Path, content: &str) -> String {
    let doc = parse_document(content, path);
    let mut parts: Vec<String> = Vec::new();

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().replace(['-', '_'], " "))
        .unwrap_or_default();
    repeat_into(&mut parts, &stem, FILENAME_WEIGHT);

    if let Some(title) = &doc.metadata.title {
        repeat_into(&mut parts, title, TITLE_WEIGHT);
    }

    let inline_tags = extract_inline_tags(&doc.body);
    let mut tag_block = merge_tags(&doc.metadata.tags, &inline_tags);
    tag_block.extend(doc.metadata.aliases.iter().cloned());
    if !tag_block.is_empty() {
        repeat_into(&mut parts, &tag_block.join(" "), TAGS_WEIGHT);
    }

    if let Some(heading) = first_heading(&doc.body) {
        repeat_into(&mut parts, heading, HEADING_WEIGHT);
    }

    let body: Vec<&str> = doc.body.split_whitespace().take(BODY_TOKEN_LIMIT).collect();
    if !body.is_empty() {
        parts.push(body.join(" "));
    }

    parts.join("\n")
}

/// Lowercased union of frontmatter and inline tags, first occurrence wins
pub fn merge_tags(frontmatter_tags: &[String], inline_tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    frontmatter_tags
        .iter()
        .chain(inline_tags)
        .map(|t| t.to_lowercase())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn repeat_into(parts: &mut Vec<String>, text: &str, times: usize) {
    parts.extend(std::iter::repeat(text.to_string()).take(times));
}
