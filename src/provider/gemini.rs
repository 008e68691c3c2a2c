//! Google Gemini client (Generative Language REST API).

use super::sse::sse_fragments;
use super::{
    build_provider_http_client, classify_failure, send_checked, CompletionStream,
    FailureSignals, ModelFamily, ModelProviderClient, ModelTiers,
};
use crate::config::{CompletionOptions, ProviderSettings};
use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

const SIGNALS: FailureSignals = FailureSignals {
    rate_limited: &["RESOURCE_EXHAUSTED"],
    not_found: &["NOT_FOUND"],
};

pub struct GeminiClient {
    client: Client,
    api_key: String,
    endpoint: String,
    family: ModelFamily,
    tiers: ModelTiers,
    options: CompletionOptions,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        family: ModelFamily,
        settings: &ProviderSettings,
    ) -> Result<Self, ApiError> {
        let client =
            build_provider_http_client(Duration::from_secs(settings.request_timeout_secs))?;
        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            client,
            api_key,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            family,
            tiers: settings.tiers(family),
            options: settings.options.clone(),
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });
        let mut generation = serde_json::Map::new();
        if let Some(temperature) = self.options.temperature {
            generation.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = self.options.max_tokens {
            generation.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }
        body
    }
}

/// Concatenate the text parts of the first candidate.
pub(crate) fn candidate_text(response: &Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    Some(text)
}

fn embedded_error(response: &Value) -> Option<ApiError> {
    let error = response.get("error")?;
    let status = error.get("code").and_then(Value::as_u64).unwrap_or(0) as u16;
    Some(classify_failure(status, &error.to_string(), &SIGNALS))
}

/// Decode one `streamGenerateContent?alt=sse` event.
pub(crate) fn decode_stream_event(data: &str) -> Result<Option<String>, ApiError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| ApiError::ProviderError(format!("Malformed Gemini stream event: {}", e)))?;
    if let Some(err) = embedded_error(&value) {
        return Err(err);
    }
    Ok(candidate_text(&value))
}

#[async_trait]
impl ModelProviderClient for GeminiClient {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, ApiError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, model);
        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt));
        let response = send_checked(request, &SIGNALS).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::ProviderError(format!("Failed to parse response: {}", e)))?;
        if let Some(err) = embedded_error(&body) {
            return Err(err);
        }
        candidate_text(&body)
            .ok_or_else(|| ApiError::ProviderError("No candidates in response".to_string()))
    }

    async fn stream(&self, prompt: &str, model: &str) -> Result<CompletionStream, ApiError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.endpoint, model
        );
        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt));
        let response = send_checked(request, &SIGNALS).await?;
        Ok(sse_fragments(response.bytes_stream(), decode_stream_event))
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn family(&self) -> ModelFamily {
        self.family
    }

    fn tiers(&self) -> &ModelTiers {
        &self.tiers
    }
}
