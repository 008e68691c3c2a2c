//! Generation artifacts: a named tree of files plus free-form metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Component, Path};

pub mod store;

pub use store::{ArtifactStore, LatestArtifact, SavedArtifact};

/// File name of a persisted manifest.
pub const MANIFEST_FILE: &str = "project.json";

/// A generated project: `files` maps relative paths to content.
///
/// Unknown top-level keys (`dirents`, `meta`, ...) are kept in `metadata` and
/// written back unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub files: BTreeMap<String, FileEntry>,

    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Content of one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileEntry {
    Text(String),
    Record {
        content: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    /// Any other JSON value, rendered as JSON text.
    Raw(Value),
}

impl FileEntry {
    /// The text written to disk and carried by `fs.write`.
    pub fn text(&self) -> String {
        match self {
            FileEntry::Text(text) => text.clone(),
            FileEntry::Record { content, .. } => match content {
                Value::String(text) => text.clone(),
                Value::Null => String::new(),
                other => serde_json::to_string_pretty(other).unwrap_or_default(),
            },
            FileEntry::Raw(value) => serde_json::to_string_pretty(value).unwrap_or_default(),
        }
    }

    pub fn declared_language(&self) -> Option<&str> {
        match self {
            FileEntry::Record {
                language: Some(language),
                ..
            } => Some(language.as_str()),
            _ => None,
        }
    }
}

/// `{"project": ...}` wrapper used on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub project: Artifact,
}

impl Artifact {
    pub fn files_count(&self) -> usize {
        self.files.len()
    }

    /// Pretty-printed `{"project": ...}` manifest text.
    pub fn manifest_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct ManifestRef<'a> {
            project: &'a Artifact,
        }
        serde_json::to_string_pretty(&ManifestRef { project: self })
    }

    /// Language tag for `path`: the declared one, else inferred from the extension.
    pub fn language_of(&self, path: &str) -> Option<String> {
        self.files
            .get(path)
            .and_then(|entry| entry.declared_language().map(str::to_string))
            .or_else(|| infer_language(path).map(str::to_string))
    }

    /// Reject paths that are absolute, empty, or climb out of the artifact root.
    pub fn validate_paths(&self) -> Result<(), String> {
        for path in self.files.keys() {
            validate_relative_path(path)?;
        }
        Ok(())
    }
}

pub fn validate_relative_path(path: &str) -> Result<(), String> {
    if path.trim().is_empty() {
        return Err("empty file path".to_string());
    }
    let candidate = Path::new(path);
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(format!("file path escapes artifact root: {}", path)),
        }
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(format!("file path escapes artifact root: {}", path));
    }
    Ok(())
}

pub fn infer_language(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "ts" | "tsx" => Some("typescript"),
        "js" | "jsx" => Some("javascript"),
        "css" => Some("css"),
        "json" => Some("json"),
        "html" => Some("html"),
        _ => None,
    }
}
