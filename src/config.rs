//! Configuration System
//!
//! Layered configuration for providers, retry policy, artifact storage, catalog and
//! logging. Sources are merged by [`ConfigLoader`]: built-in defaults, the global user
//! file, the workspace `kiln.toml`, then `KILN__SECTION__KEY` environment variables.

use crate::logging::LoggingConfig;
use crate::provider::{Complexity, ModelFamily, ModelTiers};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod loader;
mod merge;
mod sources;

pub use loader::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KilnConfig {
    /// Family used when a request does not name one
    #[serde(default)]
    pub default_family: ModelFamily,

    /// Backend settings
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Retry/backoff policy shared by every provider call
    #[serde(default)]
    pub retry: RetryConfig,

    /// Artifact output locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Content catalog source
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub gemini: ProviderSettings,
    #[serde(default)]
    pub openai: ProviderSettings,
    #[serde(default)]
    pub anthropic: ProviderSettings,
}

impl ProvidersConfig {
    pub fn for_family(&self, family: ModelFamily) -> &ProviderSettings {
        match family {
            ModelFamily::Gemini => &self.gemini,
            ModelFamily::Gpt => &self.openai,
            ModelFamily::Claude => &self.anthropic,
        }
    }
}

/// Settings for one backend family. Unset fields fall back to family defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Inline API key. Prefer `api_key_env` outside local experiments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the key (defaults per family)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Base URL override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub models: ModelOverrides,

    #[serde(default)]
    pub options: CompletionOptions,
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: None,
            endpoint: None,
            request_timeout_secs: default_request_timeout_secs(),
            models: ModelOverrides::default(),
            options: CompletionOptions::default(),
        }
    }
}

impl ProviderSettings {
    /// Model tiers for `family`, with configured overrides applied.
    pub fn tiers(&self, family: ModelFamily) -> ModelTiers {
        let base = ModelTiers::defaults_for(family);
        let pick = |value: &Option<String>, fallback: String| value.clone().unwrap_or(fallback);
        ModelTiers {
            default: pick(&self.models.default, base.default),
            cheap: pick(&self.models.cheap, base.cheap),
            medium: pick(&self.models.medium, base.medium),
            high: pick(&self.models.high, base.high),
        }
    }

    /// Resolve the API key from the inline value or the environment.
    pub fn resolve_api_key(&self, family: ModelFamily) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Some(key.clone());
        }
        let var = self
            .api_key_env
            .clone()
            .unwrap_or_else(|| family.default_api_key_env().to_string());
        std::env::var(var).ok().filter(|k| !k.trim().is_empty())
    }

    pub fn validate(&self, family: ModelFamily) -> Result<(), String> {
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than zero".to_string());
        }
        let tiers = self.tiers(family);
        for complexity in [Complexity::Low, Complexity::Medium, Complexity::High] {
            if tiers.for_complexity(complexity).trim().is_empty() {
                return Err(format!("model for {} complexity is empty", complexity));
            }
        }
        if let Some(temperature) = self.options.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(format!("temperature {} outside 0.0..=2.0", temperature));
            }
        }
        Ok(())
    }
}

/// Per-tier model name overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cheap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<String>,
}

/// Sampling options forwarded to the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Retry/backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per candidate model
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff unit; attempt `n` waits `base_delay_ms * 2^n`
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Artifact storage locations, relative to the workspace unless absolute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_modified_dir")]
    pub modified_dir: PathBuf,

    /// Mirror every emitted event to a JSON-lines log
    #[serde(default = "default_true")]
    pub event_log: bool,

    /// Event log file name, inside `output_dir`
    #[serde(default = "default_event_log_file")]
    pub event_log_file: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_modified_dir() -> PathBuf {
    PathBuf::from("modified_output")
}

fn default_event_log_file() -> PathBuf {
    PathBuf::from("events.jsonl")
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            modified_dir: default_modified_dir(),
            event_log: true,
            event_log_file: default_event_log_file(),
        }
    }
}

impl StorageConfig {
    pub fn output_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.output_dir)
    }

    pub fn modified_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.modified_dir)
    }

    pub fn event_log_path(&self, workspace: &Path) -> Option<PathBuf> {
        self.event_log
            .then(|| self.output_path(workspace).join(&self.event_log_file))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.output_dir.as_os_str().is_empty() {
            return Err("output_dir cannot be empty".to_string());
        }
        if self.modified_dir.as_os_str().is_empty() {
            return Err("modified_dir cannot be empty".to_string());
        }
        if self.output_dir == self.modified_dir {
            return Err("output_dir and modified_dir must differ".to_string());
        }
        Ok(())
    }
}

/// Catalog source. The built-in catalog is used when no path is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Provider(String, String),
    Retry(String),
    Storage(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(name, msg) => write!(f, "Provider '{}': {}", name, msg),
            ValidationError::Retry(msg) => write!(f, "Retry: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ));
        }
        Ok(())
    }
}

impl KilnConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for family in ModelFamily::ALL {
            if let Err(e) = self.providers.for_family(family).validate(family) {
                errors.push(ValidationError::Provider(family.as_str().to_string(), e));
            }
        }

        if let Err(e) = self.retry.validate() {
            errors.push(ValidationError::Retry(e));
        }

        if let Err(e) = self.storage.validate() {
            errors.push(ValidationError::Storage(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
