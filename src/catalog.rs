//! Content-category catalog.
//!
//! The orchestrator only sees the [`Catalog`] trait. [`StaticCatalog`] is backed by
//! TOML, either the built-in document or a file named in `catalog.path`.

use crate::error::ApiError;
use crate::events::QuestionKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Key used when no specific page type applies.
pub const GENERIC_PAGE_TYPE: &str = "generic";

const BUILTIN: &str = include_str!("catalog/builtin.toml");

/// A selectable content category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub key: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub description: String,
}

/// Prompt enrichment for one page type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageProfile {
    pub name: String,
    pub category: String,
    pub end_user: String,
    #[serde(default)]
    pub core_pages: Vec<String>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// One questionnaire entry as authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionTemplate {
    pub id: String,
    pub question: String,
    /// `radio`, `multiselect` or free text
    #[serde(rename = "type", default = "default_template_type")]
    pub template_type: String,
    #[serde(default)]
    pub options: Vec<String>,
}

fn default_template_type() -> String {
    "text".to_string()
}

impl QuestionTemplate {
    pub fn question_kind(&self) -> QuestionKind {
        match self.template_type.as_str() {
            "radio" => QuestionKind::Mcq,
            "multiselect" => QuestionKind::MultiSelect,
            _ => QuestionKind::OpenEnded,
        }
    }
}

/// Read access to categories, profiles and questionnaires.
pub trait Catalog: Send + Sync {
    fn categories(&self) -> Vec<Category>;

    fn profile(&self, key: &str) -> Option<PageProfile>;

    fn questionnaire(&self, key: &str) -> Option<Vec<QuestionTemplate>>;

    /// Best page type by keyword hits, with hits / keyword count as confidence.
    fn match_keywords(&self, text: &str) -> Option<(String, f64)>;

    fn is_known(&self, key: &str) -> bool {
        self.categories().iter().any(|c| c.key == key)
    }

    fn display_name(&self, key: &str) -> Option<String> {
        self.categories()
            .into_iter()
            .find(|c| c.key == key)
            .map(|c| c.display_name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    categories: Vec<Category>,
    #[serde(default)]
    profiles: BTreeMap<String, PageProfile>,
    #[serde(default)]
    questionnaires: BTreeMap<String, Vec<QuestionTemplate>>,
}

/// TOML-backed catalog.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    doc: CatalogDocument,
}

impl StaticCatalog {
    pub fn builtin() -> Result<Self, ApiError> {
        Self::from_toml_str(BUILTIN)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ApiError> {
        let doc: CatalogDocument = toml::from_str(text)
            .map_err(|e| ApiError::ConfigError(format!("Invalid catalog: {}", e)))?;
        for key in doc.profiles.keys().chain(doc.questionnaires.keys()) {
            if !doc.categories.iter().any(|c| &c.key == key) {
                return Err(ApiError::ConfigError(format!(
                    "Catalog entry {} has no matching category",
                    key
                )));
            }
        }
        Ok(Self { doc })
    }

    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let text = fs::read_to_string(path).map_err(|e| {
            ApiError::ConfigError(format!("Failed to read catalog {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Loaded catalog file");
        Self::from_toml_str(&text)
    }

    /// The configured catalog file, else the built-in one.
    pub fn from_config(path: Option<&Path>) -> Result<Self, ApiError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }
}

impl Catalog for StaticCatalog {
    fn categories(&self) -> Vec<Category> {
        self.doc.categories.clone()
    }

    fn profile(&self, key: &str) -> Option<PageProfile> {
        self.doc.profiles.get(key).cloned()
    }

    fn questionnaire(&self, key: &str) -> Option<Vec<QuestionTemplate>> {
        self.doc
            .questionnaires
            .get(key)
            .filter(|questions| !questions.is_empty())
            .cloned()
    }

    fn match_keywords(&self, text: &str) -> Option<(String, f64)> {
        let lowered = text.to_lowercase();
        let mut best: Option<(&String, usize, usize)> = None;
        for (key, profile) in &self.doc.profiles {
            let hits = profile
                .keywords
                .iter()
                .filter(|kw| lowered.contains(kw.as_str()))
                .count();
            if hits > 0 && best.map_or(true, |(_, top, _)| hits > top) {
                best = Some((key, hits, profile.keywords.len()));
            }
        }
        best.map(|(key, hits, total)| (key.clone(), hits as f64 / total.max(1) as f64))
    }
}
