//! Model Provider Abstraction
//!
//! Uniform interface over the generative backends (Gemini, OpenAI, Anthropic). Each
//! client exposes full and streamed completion plus model-tier selection, and maps its
//! backend-specific failure signals onto the shared [`FailureKind`] classification
//! consumed by the retry/fallback controller.
//!
//! [`FailureKind`]: crate::error::FailureKind

use crate::config::{ProviderSettings, ProvidersConfig};
use crate::error::ApiError;
use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod retry;
pub mod sse;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAIClient;
pub use retry::{FallbackController, RetryPolicy};

/// Backend family selectable per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    #[default]
    Gemini,
    #[serde(alias = "openai")]
    Gpt,
    #[serde(alias = "anthropic")]
    Claude,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 3] = [ModelFamily::Gemini, ModelFamily::Gpt, ModelFamily::Claude];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelFamily::Gemini => "gemini",
            ModelFamily::Gpt => "gpt",
            ModelFamily::Claude => "claude",
        }
    }

    pub fn default_api_key_env(self) -> &'static str {
        match self {
            ModelFamily::Gemini => "GEMINI_API_KEY",
            ModelFamily::Gpt => "OPENAI_API_KEY",
            ModelFamily::Claude => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ModelFamily::Gemini),
            "gpt" | "openai" => Ok(ModelFamily::Gpt),
            "claude" | "anthropic" => Ok(ModelFamily::Claude),
            other => Err(ApiError::InvalidRequest(format!(
                "Unknown model family: {} (expected gemini, gpt or claude)",
                other
            ))),
        }
    }
}

/// Modification complexity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        }
    }

    /// Parse a model-reported tier; anything unrecognised is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Complexity::Low),
            "medium" => Some(Complexity::Medium),
            "high" => Some(Complexity::High),
            _ => None,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model names for one family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTiers {
    pub default: String,
    pub cheap: String,
    pub medium: String,
    pub high: String,
}

impl ModelTiers {
    pub fn defaults_for(family: ModelFamily) -> Self {
        let (default, cheap, medium, high) = match family {
            ModelFamily::Gemini => (
                "gemini-3-pro-preview",
                "gemini-2.0-flash",
                "gemini-2.0-flash",
                "gemini-3-pro-preview",
            ),
            ModelFamily::Gpt => ("gpt-4o", "gpt-4o-mini", "gpt-4o", "gpt-4o"),
            ModelFamily::Claude => (
                "claude-3-5-sonnet-20241022",
                "claude-3-haiku-20240307",
                "claude-3-opus-20240229",
                "claude-3-5-sonnet-20241022",
            ),
        };
        Self {
            default: default.to_string(),
            cheap: cheap.to_string(),
            medium: medium.to_string(),
            high: high.to_string(),
        }
    }

    pub fn for_complexity(&self, complexity: Complexity) -> &str {
        match complexity {
            Complexity::Low => &self.cheap,
            Complexity::Medium => &self.medium,
            Complexity::High => &self.high,
        }
    }
}

/// Streaming completion type: finite, not restartable.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, ApiError>> + Send>>;

/// Model provider client trait
#[async_trait]
pub trait ModelProviderClient: Send + Sync {
    /// Generate a full completion for `prompt` with `model`
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, ApiError>;

    /// Generate a streaming completion for `prompt` with `model`
    async fn stream(&self, prompt: &str, model: &str) -> Result<CompletionStream, ApiError>;

    /// Get the provider name
    fn provider_name(&self) -> &str;

    fn family(&self) -> ModelFamily;

    fn tiers(&self) -> &ModelTiers;

    fn cheap_model(&self) -> &str {
        &self.tiers().cheap
    }

    fn default_model(&self) -> &str {
        &self.tiers().default
    }

    fn model_for_complexity(&self, complexity: Complexity) -> &str {
        self.tiers().for_complexity(complexity)
    }
}

/// Backend-specific markers that classify an error body.
pub(crate) struct FailureSignals {
    pub rate_limited: &'static [&'static str],
    pub not_found: &'static [&'static str],
}

/// Map a failed response (or an in-stream error with `status == 0`) to a typed error.
pub(crate) fn classify_failure(status: u16, body: &str, signals: &FailureSignals) -> ApiError {
    let has = |markers: &[&str]| markers.iter().any(|m| body.contains(m));
    if status == 401 || status == 403 {
        ApiError::ProviderAuthFailed(format!("Authentication failed: {}", body))
    } else if status == 429 || has(signals.rate_limited) {
        ApiError::ProviderRateLimit(format!("Rate limit exceeded: {}", body))
    } else if status == 404 || has(signals.not_found) {
        ApiError::ProviderModelNotFound(format!("Model not found: {}", body))
    } else if status == 0 {
        ApiError::ProviderError(body.to_string())
    } else {
        ApiError::ProviderRequestFailed(format!("Request failed with status {}: {}", status, body))
    }
}

// Helper function to map HTTP errors to ApiError
pub(crate) fn map_http_error(error: reqwest::Error) -> ApiError {
    if let Some(status) = error.status() {
        match status.as_u16() {
            401 | 403 => ApiError::ProviderAuthFailed(format!("Authentication failed: {}", error)),
            429 => ApiError::ProviderRateLimit(format!("Rate limit exceeded: {}", error)),
            404 => ApiError::ProviderModelNotFound(format!("Model not found: {}", error)),
            _ => ApiError::ProviderRequestFailed(format!(
                "Request failed with status {}: {}",
                status, error
            )),
        }
    } else if error.is_timeout() {
        ApiError::ProviderRequestFailed(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::ProviderRequestFailed(format!("Connection error: {}", error))
    } else {
        ApiError::ProviderError(format!("HTTP error: {}", error))
    }
}

/// Send a request and turn non-success statuses into classified errors.
pub(crate) async fn send_checked(
    request: RequestBuilder,
    signals: &FailureSignals,
) -> Result<Response, ApiError> {
    let response = request.send().await.map_err(map_http_error)?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(classify_failure(status, &error_text, signals));
    }
    Ok(response)
}

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_provider_http_client(request_timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .no_proxy()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| ApiError::ProviderError(format!("Failed to create HTTP client: {}", e)))
}

/// Provider factory for creating provider clients
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_client(
        family: ModelFamily,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn ModelProviderClient>, ApiError> {
        let api_key = settings.resolve_api_key(family).ok_or_else(|| {
            ApiError::ProviderNotConfigured(format!(
                "No API key for {} (set {} or providers.{}.api_key)",
                family,
                settings
                    .api_key_env
                    .as_deref()
                    .unwrap_or(family.default_api_key_env()),
                config_section(family)
            ))
        })?;

        Ok(match family {
            ModelFamily::Gemini => Arc::new(GeminiClient::new(api_key, family, settings)?),
            ModelFamily::Gpt => Arc::new(OpenAIClient::new(api_key, family, settings)?),
            ModelFamily::Claude => Arc::new(AnthropicClient::new(api_key, family, settings)?),
        })
    }
}

fn config_section(family: ModelFamily) -> &'static str {
    match family {
        ModelFamily::Gemini => "gemini",
        ModelFamily::Gpt => "openai",
        ModelFamily::Claude => "anthropic",
    }
}

/// Resolves a backend client for a family.
pub trait ProviderResolver: Send + Sync {
    fn resolve(&self, family: ModelFamily) -> Result<Arc<dyn ModelProviderClient>, ApiError>;

    /// Families that can currently be resolved.
    fn configured_families(&self) -> Vec<ModelFamily> {
        ModelFamily::ALL
            .into_iter()
            .filter(|family| self.resolve(*family).is_ok())
            .collect()
    }
}

/// Creates clients from configuration on first use and caches them.
pub struct ProviderRegistry {
    settings: ProvidersConfig,
    clients: Mutex<HashMap<ModelFamily, Arc<dyn ModelProviderClient>>>,
}

impl ProviderRegistry {
    pub fn new(settings: ProvidersConfig) -> Self {
        Self {
            settings,
            clients: Mutex::new(HashMap::new()),
        }
    }
}

impl ProviderResolver for ProviderRegistry {
    fn resolve(&self, family: ModelFamily) -> Result<Arc<dyn ModelProviderClient>, ApiError> {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&family) {
            return Ok(client.clone());
        }
        let client = ProviderFactory::create_client(family, self.settings.for_family(family))?;
        debug!(family = %family, provider = client.provider_name(), "Created provider client");
        clients.insert(family, client.clone());
        Ok(client)
    }

    fn configured_families(&self) -> Vec<ModelFamily> {
        ModelFamily::ALL
            .into_iter()
            .filter(|family| {
                self.settings
                    .for_family(*family)
                    .resolve_api_key(*family)
                    .is_some()
            })
            .collect()
    }
}

/// Serves every family with one client.
pub struct FixedProvider(pub Arc<dyn ModelProviderClient>);

impl ProviderResolver for FixedProvider {
    fn resolve(&self, _family: ModelFamily) -> Result<Arc<dyn ModelProviderClient>, ApiError> {
        Ok(self.0.clone())
    }
}

// Mock provider for testing
#[cfg(test)]
pub struct MockProvider {
    responses: Vec<String>,
    current: std::sync::Arc<std::sync::Mutex<usize>>,
    tiers: ModelTiers,
}

#[cfg(test)]
impl MockProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            current: std::sync::Arc::new(std::sync::Mutex::new(0)),
            tiers: ModelTiers::defaults_for(ModelFamily::Gemini),
        }
    }

    fn next_response(&self) -> String {
        let mut idx = self.current.lock().unwrap();
        let response = self
            .responses
            .get(*idx)
            .cloned()
            .unwrap_or_else(|| "Mock response".to_string());
        *idx += 1;
        response
    }
}

#[cfg(test)]
#[async_trait]
impl ModelProviderClient for MockProvider {
    async fn complete(&self, _prompt: &str, _model: &str) -> Result<String, ApiError> {
        Ok(self.next_response())
    }

    async fn stream(&self, _prompt: &str, _model: &str) -> Result<CompletionStream, ApiError> {
        let text = self.next_response();
        let pieces: Vec<Result<String, ApiError>> = text
            .as_bytes()
            .chunks(16)
            .map(|c| Ok(String::from_utf8_lossy(c).into_owned()))
            .collect();
        Ok(Box::pin(futures::stream::iter(pieces)))
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::Gemini
    }

    fn tiers(&self) -> &ModelTiers {
        &self.tiers
    }
}
