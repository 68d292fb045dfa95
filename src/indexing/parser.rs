use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::path::Path;
use tracing::warn;

/// Metadata extracted from frontmatter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub aliases: Vec<String>,
}

/// A document split into its frontmatter metadata and body
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub metadata: DocumentMetadata,
    /// Content with the frontmatter block removed
    pub body: String,
}

/// Split a document into frontmatter metadata and body.
///
/// Frontmatter that cannot be parsed as a YAML mapping is treated as absent and
/// the body is the unmodified content.
pub fn parse_document(content: &str, path: &Path) -> ParsedDocument {
    let Some((frontmatter, body)) = extract_frontmatter(content) else {
        return ParsedDocument {
            metadata: DocumentMetadata::default(),
            body: content.to_string(),
        };
    };

    match parse_frontmatter(frontmatter) {
        Ok(metadata) => ParsedDocument {
            metadata,
            body: body.trim().to_string(),
        },
        Err(reason) => {
            warn!("Failed to parse frontmatter in {}: {}", path.display(), reason);
            ParsedDocument {
                metadata: DocumentMetadata::default(),
                body: content.to_string(),
            }
        }
    }
}

/// Locate a `---` delimited block at the very start of the content.
///
/// Returns the raw block and everything after the closing delimiter line.
pub fn extract_frontmatter(content: &str) -> Option<(&str, &str)> {
    let first_end = content.find('\n')?;
    if content[..first_end].trim_end() != "---" {
        return None;
    }

    let block_start = first_end + 1;
    let mut offset = block_start;
    for line in content[block_start..].split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((&content[block_start..offset], &content[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Parse frontmatter YAML into metadata
fn parse_frontmatter(frontmatter: &str) -> std::result::Result<DocumentMetadata, String> {
    if frontmatter.trim().is_empty() {
        return Ok(DocumentMetadata::default());
    }
    let value: Value = serde_yaml::from_str(frontmatter).map_err(|e| e.to_string())?;
    let map = match value {
        Value::Null => Mapping::new(),
        Value::Mapping(map) => map,
        _ => return Err("frontmatter is not a key/value mapping".to_string()),
    };

    let title = map
        .get("title")
        .filter(|v| is_truthy(v))
        .map(scalar_to_string);

    Ok(DocumentMetadata {
        title,
        tags: string_list(map.get("tags")),
        aliases: string_list(map.get("aliases")),
    })
}

/// Coerce a list or scalar field into strings; empty values yield nothing
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(v) if !is_truthy(v) => Vec::new(),
        Some(Value::Sequence(items)) => items.iter().map(scalar_to_string).collect(),
        Some(v) => vec![scalar_to_string(v)],
        None => Vec::new(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Sequence(items) => !items.is_empty(),
        Value::Mapping(map) => !map.is_empty(),
        Value::Tagged(tagged) => is_truthy(&tagged.value),
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(items) => items
            .iter()
            .map(scalar_to_string)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        // Mappings collapse onto one line so a weighted field stays a single line
        other => serde_yaml::to_string(other)
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default(),
    }
}

/// `#` followed by a run of letters, digits, `_`, `-` or `/`
static INLINE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"#([\p{L}\p{N}_\-/]+)").expect("inline tag pattern is valid")
});

/// Extract inline `#tags` from body text, without the leading `#`.
///
/// A `#` preceded by a word character does not start a tag (`a#b`, `#one#two`).
/// Headings (`# Title`) never match because the `#` is followed by a space.
pub fn extract_inline_tags(content: &str) -> Vec<String> {
    INLINE_TAG
        .captures_iter(content)
        .filter_map(|caps| {
            let hash = caps.get(0)?;
            let preceded_by_word = content[..hash.start()]
                .chars()
                .next_back()
                .is_some_and(is_word_char);
            (!preceded_by_word).then(|| caps[1].to_string())
        })
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// First line starting with `# ` (after trimming), returning the heading text
pub fn first_heading(body: &str) -> Option<&str> {
    body.lines()
        .map(str::trim)
        .find(|line| line.starts_with("# "))
        .map(|line| line[2..].trim())
}
