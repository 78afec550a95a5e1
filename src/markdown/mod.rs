//! Markdown frontmatter parsing.
//!
//! Primitive files are Markdown with optional YAML frontmatter delimited
//! by `---` lines. The opening delimiter must be the first line of the
//! file; the closing delimiter is the next line that is exactly `---`.
//! The body is everything after the closing delimiter's line terminator,
//! byte for byte. A document without a leading `---` has an empty
//! frontmatter map and its full text as body.

use serde_yaml::{Mapping, Value};
use std::path::Path;

use crate::core::ApmError;

/// Parsed YAML frontmatter as a string-keyed mapping.
///
/// Unknown keys are preserved in the map but ignored by callers, which
/// read only the fields their primitive kind defines.
#[derive(Debug, Clone, Default)]
pub struct Frontmatter {
    map: Mapping,
}

impl Frontmatter {
    /// True when no frontmatter was present or the block was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Look up a string field. Non-string YAML values return `None`.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(Value::as_str)
    }

    /// Look up a string field, trimmed, treating empty strings as absent.
    #[must_use]
    pub fn get_non_empty_str(&self, key: &str) -> Option<&str> {
        self.get_str(key).map(str::trim).filter(|s| !s.is_empty())
    }

    /// Look up a list-of-strings field.
    ///
    /// A scalar string is accepted as a one-element list, matching how
    /// workflow `input:` and `mcp:` fields are commonly written.
    #[must_use]
    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        match self.map.get(key) {
            Some(Value::Sequence(seq)) => {
                seq.iter().filter_map(Value::as_str).map(str::to_string).collect()
            }
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// Result of splitting a primitive file into frontmatter and body.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// The parsed frontmatter mapping (empty when absent).
    pub frontmatter: Frontmatter,
    /// Document body after the frontmatter block, unmodified.
    pub body: String,
}

/// Split `input` into frontmatter and body.
///
/// # Errors
///
/// [`ApmError::MalformedFrontmatter`] when the opening delimiter has no
/// closing `---` line, when the YAML between the delimiters fails to
/// parse, or when it parses to something other than a mapping.
pub fn parse_document(input: &str, file: &Path) -> Result<ParsedDocument, ApmError> {
    let Some(block) = find_frontmatter_block(input) else {
        if has_opening_delimiter(input) {
            return Err(ApmError::MalformedFrontmatter {
                file: file.display().to_string(),
                reason: "unterminated frontmatter: no closing '---' line".to_string(),
            });
        }
        return Ok(ParsedDocument {
            frontmatter: Frontmatter::default(),
            body: input.to_string(),
        });
    };

    let yaml_text = &input[block.yaml_start..block.yaml_end];
    let body = input[block.body_start..].to_string();

    let map = if yaml_text.trim().is_empty() {
        Mapping::new()
    } else {
        let value: Value = serde_yaml::from_str(yaml_text).map_err(|e| {
            ApmError::MalformedFrontmatter {
                file: file.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        match value {
            Value::Mapping(map) => map,
            Value::Null => Mapping::new(),
            other => {
                return Err(ApmError::MalformedFrontmatter {
                    file: file.display().to_string(),
                    reason: format!(
                        "frontmatter must be a YAML mapping, found {}",
                        yaml_type_name(&other)
                    ),
                });
            }
        }
    };

    Ok(ParsedDocument {
        frontmatter: Frontmatter {
            map,
        },
        body,
    })
}

fn has_opening_delimiter(input: &str) -> bool {
    input == "---"
        || input.starts_with("---\n")
        || input.starts_with("---\r\n")
}

struct FrontmatterBlock {
    yaml_start: usize,
    yaml_end: usize,
    body_start: usize,
}

/// Locate the frontmatter block byte ranges.
///
/// Scans line by line from the opening delimiter, tracking byte offsets
/// so the body can be sliced without modification. Returns `None` when
/// the document has no frontmatter (no opening delimiter or no closing
/// delimiter found).
fn find_frontmatter_block(input: &str) -> Option<FrontmatterBlock> {
    let yaml_start = if input.starts_with("---\n") {
        4
    } else if input.starts_with("---\r\n") {
        5
    } else {
        return None;
    };

    let mut pos = yaml_start;
    let rest = &input[yaml_start..];
    for line in rest.split_inclusive('\n') {
        let trimmed = line.strip_suffix('\n').unwrap_or(line);
        let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
        if trimmed == "---" {
            return Some(FrontmatterBlock {
                yaml_start,
                yaml_end: pos,
                body_start: pos + line.len(),
            });
        }
        pos += line.len();
    }

    None
}

fn yaml_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
