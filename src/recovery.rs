//! Recovery parser: turns raw model output into an [`Artifact`].
//!
//! Model output routinely wraps the JSON in prose or code fences, leaves trailing
//! commas, or closes an array too early. Candidates are tried in a fixed order, from
//! the untouched text to doubly-repaired extracted text. The first candidate that
//! parses and has an accepted shape wins. The parser never panics; a miss returns a
//! [`ParseFailure`] with positional context for logging.

use crate::artifact::Artifact;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

pub mod repair;

pub use repair::{relocate_stray_items, repair_common};

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)```").expect("valid fence pattern"));
static ANY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*(.*?)```").expect("valid fence pattern"));

/// Characters of surrounding text kept on each side of a parse error.
const CONTEXT_RADIUS: usize = 100;

/// Why no candidate produced an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub reason: String,
    /// 1-based; 0 when the failure is not positional
    pub line: usize,
    pub column: usize,
    pub error_line: String,
    pub context: String,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.reason)
        } else {
            write!(
                f,
                "{} at line {} column {}: {}",
                self.reason, self.line, self.column, self.error_line
            )
        }
    }
}

impl std::error::Error for ParseFailure {}

/// Parse model output into an artifact.
pub fn parse_artifact(text: &str) -> Result<Artifact, ParseFailure> {
    let extracted = extract_json_block(text);
    let candidates = candidates(text, extracted);

    let mut syntax_failure: Option<ParseFailure> = None;
    let mut shape_failure: Option<String> = None;

    for (strategy, candidate) in &candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => match normalize_shape(value) {
                Ok(artifact) => {
                    tracing::debug!(strategy = *strategy, files = artifact.files_count(), "Recovered artifact");
                    return Ok(artifact);
                }
                Err(reason) => {
                    shape_failure.get_or_insert(reason);
                }
            },
            Err(err) => {
                // Positions are reported against the unrepaired payload
                let primary = extracted.unwrap_or(text);
                if syntax_failure.is_none() && candidate.as_str() == primary {
                    syntax_failure = Some(positional_failure(candidate, &err));
                }
            }
        }
    }

    if let Some(reason) = shape_failure {
        return Err(ParseFailure {
            reason,
            line: 0,
            column: 0,
            error_line: String::new(),
            context: String::new(),
        });
    }
    Err(syntax_failure.unwrap_or_else(|| ParseFailure {
        reason: "no JSON value found in model output".to_string(),
        line: 0,
        column: 0,
        error_line: String::new(),
        context: excerpt(text, 0),
    }))
}

fn candidates(text: &str, extracted: Option<&str>) -> Vec<(&'static str, String)> {
    let mut list: Vec<(&'static str, String)> = vec![("direct", text.to_string())];
    if let Some(block) = extracted.filter(|block| *block != text) {
        list.push(("extracted", block.to_string()));
    }
    list.push(("repaired", repair_common(text)));
    list.push(("stray_items", relocate_stray_items(text)));
    if let Some(block) = extracted {
        let repaired = repair_common(block);
        let both = relocate_stray_items(&repaired);
        list.push(("extracted_repaired", repaired));
        list.push(("extracted_stray_items", relocate_stray_items(block)));
        list.push(("extracted_both", both));
    }

    let mut seen: Vec<String> = Vec::with_capacity(list.len());
    list.retain(|(_, candidate)| {
        if seen.contains(candidate) {
            false
        } else {
            seen.push(candidate.clone());
            true
        }
    });
    list
}

/// Locate the JSON payload inside surrounding prose.
///
/// Prefers the largest ```json fence, then the largest bare fence whose content
/// starts with `{` or `[`, then the span from the first `{` to the last `}`, then
/// the first `[` to the last `]`.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let largest = |re: &Regex, require_json_start: bool| {
        re.captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|block| {
                !block.is_empty()
                    && (!require_json_start || block.starts_with('{') || block.starts_with('['))
            })
            .max_by_key(|block| block.len())
    };

    if let Some(block) = largest(&JSON_FENCE, false) {
        return Some(block);
    }
    if let Some(block) = largest(&ANY_FENCE, true) {
        return Some(block);
    }
    span_between(text, '{', '}').or_else(|| span_between(text, '[', ']'))
}

fn span_between(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Accept `{"project": {...}}`, a list holding such an object, or a bare artifact.
///
/// `project` is only unwrapped when it holds a `files` object; otherwise an
/// object with its own `files` is a bare artifact and keeps `project` as metadata.
pub fn normalize_shape(value: Value) -> Result<Artifact, String> {
    match value {
        Value::Object(mut map) => {
            let wrapped = map.get("project").map_or(false, holds_files);
            if !wrapped && map.contains_key("files") {
                return artifact_from(Value::Object(map));
            }
            match map.remove("project") {
                Some(project) => artifact_from(project),
                None => Err("JSON object has neither a \"project\" nor a \"files\" key".to_string()),
            }
        }
        Value::Array(items) => {
            let mut shaped: Vec<Value> = items
                .into_iter()
                .filter(|item| item.get("project").is_some() || item.get("files").is_some())
                .collect();
            if shaped.is_empty() {
                return Err("JSON array contains no object with a \"project\" or \"files\" key".to_string());
            }
            let pick = shaped
                .iter()
                .position(|item| item.get("project").map_or(false, holds_files) || holds_files(item))
                .unwrap_or(0);
            normalize_shape(shaped.swap_remove(pick))
        }
        other => Err(format!("expected a JSON object, found {}", kind_of(&other))),
    }
}

fn holds_files(value: &Value) -> bool {
    value.get("files").map_or(false, Value::is_object)
}

fn artifact_from(value: Value) -> Result<Artifact, String> {
    if !holds_files(&value) {
        return Err("project has no \"files\" object".to_string());
    }
    let artifact: Artifact =
        serde_json::from_value(value).map_err(|e| format!("invalid project: {}", e))?;
    artifact.validate_paths()?;
    Ok(artifact)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn positional_failure(text: &str, err: &serde_json::Error) -> ParseFailure {
    let line = err.line();
    let column = err.column();
    let error_line = text
        .lines()
        .nth(line.saturating_sub(1))
        .unwrap_or_default()
        .to_string();
    let offset = char_offset(text, line, column);
    ParseFailure {
        reason: err.to_string(),
        line,
        column,
        error_line,
        context: excerpt(text, offset),
    }
}

/// Char offset of serde's 1-based line and byte column.
fn char_offset(text: &str, line: usize, column: usize) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    let byte = (line_start + column.saturating_sub(1)).min(text.len());
    text.char_indices().take_while(|(i, _)| *i < byte).count()
}

/// Up to [`CONTEXT_RADIUS`] characters either side of char offset `at`.
fn excerpt(text: &str, at: usize) -> String {
    let start = at.saturating_sub(CONTEXT_RADIUS);
    text.chars().skip(start).take(CONTEXT_RADIUS * 2).collect()
}
