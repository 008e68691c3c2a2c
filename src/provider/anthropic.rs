//! Anthropic messages client.

use super::sse::sse_fragments;
use super::{
    build_provider_http_client, classify_failure, send_checked, CompletionStream,
    FailureSignals, ModelFamily, ModelProviderClient, ModelTiers,
};
use crate::config::{CompletionOptions, ProviderSettings};
use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 8192;

const SIGNALS: FailureSignals = FailureSignals {
    rate_limited: &["rate_limit_error", "overloaded_error"],
    not_found: &["not_found_error"],
};

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    family: ModelFamily,
    tiers: ModelTiers,
    options: CompletionOptions,
}

impl AnthropicClient {
    pub fn new(
        api_key: String,
        family: ModelFamily,
        settings: &ProviderSettings,
    ) -> Result<Self, ApiError> {
        let client =
            build_provider_http_client(Duration::from_secs(settings.request_timeout_secs))?;
        let base_url = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            family,
            tiers: settings.tiers(family),
            options: settings.options.clone(),
        })
    }

    fn request_body(&self, prompt: &str, model: &str, stream: bool) -> Value {
        let mut body = json!({
            "model": model,
            "max_tokens": self.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": [{ "role": "user", "content": prompt }],
            "stream": stream,
        });
        if let Some(temperature) = self.options.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    fn post(&self, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
    }
}

/// Decode one messages-stream event. Only text deltas carry content.
pub(crate) fn decode_stream_event(data: &str) -> Result<Option<String>, ApiError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| ApiError::ProviderError(format!("Malformed Anthropic stream event: {}", e)))?;
    match value.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => Ok(value
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .map(str::to_string)),
        Some("error") => {
            let error = value.get("error").cloned().unwrap_or(Value::Null);
            Err(classify_failure(0, &error.to_string(), &SIGNALS))
        }
        _ => Ok(None),
    }
}

#[async_trait]
impl ModelProviderClient for AnthropicClient {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, ApiError> {
        #[derive(Deserialize)]
        struct AnthropicResponse {
            content: Vec<AnthropicContent>,
        }

        #[derive(Deserialize)]
        struct AnthropicContent {
            #[serde(default)]
            text: String,
        }

        let response =
            send_checked(self.post(&self.request_body(prompt, model, false)), &SIGNALS).await?;
        let completion: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ApiError::ProviderError(format!("Failed to parse response: {}", e)))?;

        Ok(completion.content.into_iter().map(|c| c.text).collect())
    }

    async fn stream(&self, prompt: &str, model: &str) -> Result<CompletionStream, ApiError> {
        let response =
            send_checked(self.post(&self.request_body(prompt, model, true)), &SIGNALS).await?;
        Ok(sse_fragments(response.bytes_stream(), decode_stream_event))
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn family(&self) -> ModelFamily {
        self.family
    }

    fn tiers(&self) -> &ModelTiers {
        &self.tiers
    }
}
