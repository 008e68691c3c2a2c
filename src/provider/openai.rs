//! OpenAI chat-completions client.

use super::sse::sse_fragments;
use super::{
    build_provider_http_client, classify_failure, send_checked, CompletionStream,
    FailureSignals, ModelFamily, ModelProviderClient, ModelTiers,
};
use crate::config::{CompletionOptions, ProviderSettings};
use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

const SIGNALS: FailureSignals = FailureSignals {
    rate_limited: &["rate_limit"],
    not_found: &["model_not_found"],
};

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI provider client
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
    family: ModelFamily,
    tiers: ModelTiers,
    options: CompletionOptions,
}

impl OpenAIClient {
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

    fn request<'a>(&self, prompt: &'a str, model: &'a str, stream: bool) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model,
            messages: vec![OpenAIMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
            stream,
        }
    }
}

/// Decode one streamed chunk: `choices[0].delta.content`.
pub(crate) fn decode_stream_event(data: &str) -> Result<Option<String>, ApiError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| ApiError::ProviderError(format!("Malformed OpenAI stream event: {}", e)))?;
    if let Some(error) = value.get("error") {
        return Err(classify_failure(0, &error.to_string(), &SIGNALS));
    }
    Ok(value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .map(str::to_string))
}

#[async_trait]
impl ModelProviderClient for OpenAIClient {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request(prompt, model, false));
        let response = send_checked(request, &SIGNALS).await?;

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::ProviderError(format!("Failed to parse response: {}", e)))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::ProviderError("No choices in response".to_string()))?;
        Ok(choice.message.content.unwrap_or_default())
    }

    async fn stream(&self, prompt: &str, model: &str) -> Result<CompletionStream, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request(prompt, model, true));
        let response = send_checked(request, &SIGNALS).await?;
        Ok(sse_fragments(response.bytes_stream(), decode_stream_event))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn family(&self) -> ModelFamily {
        self.family
    }

    fn tiers(&self) -> &ModelTiers {
        &self.tiers
    }
}
