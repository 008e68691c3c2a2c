//! Bounded retry with exponential backoff, then ordered fallback across models.

use super::{CompletionStream, ModelProviderClient};
use crate::config::RetryConfig;
use crate::error::{ApiError, FailureKind};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Backoff settings for one controller.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per candidate model, at least one.
    pub max_retries: u32,
    /// Delay before the second attempt; doubled on each further attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Attempt 0 waits `base_delay`, attempt 1 twice that, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self
            .base_delay
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        delay.min(self.max_delay)
    }

    fn attempts_per_model(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Drives a call across `[primary] + fallbacks`.
///
/// Rate-limited failures back off and retry the same model. Not-found and other
/// failures abandon the model at once. Duplicate names are tried only once, so a
/// model is never revisited after it has been abandoned.
#[derive(Debug, Clone, Default)]
pub struct FallbackController {
    policy: RetryPolicy,
}

impl FallbackController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Ordered, de-duplicated candidate list.
    pub fn candidates(primary: &str, fallbacks: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(fallbacks.len() + 1);
        for model in std::iter::once(primary).chain(fallbacks.iter().map(String::as_str)) {
            if !model.is_empty() && !out.iter().any(|m| m == model) {
                out.push(model.to_string());
            }
        }
        out
    }

    /// Run `call` for each candidate until one succeeds.
    pub async fn run<T, F, Fut>(
        &self,
        primary: &str,
        fallbacks: &[String],
        mut call: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let candidates = Self::candidates(primary, fallbacks);
        let per_model = self.policy.attempts_per_model();
        let mut attempts = 0u32;
        let mut last_error: Option<ApiError> = None;

        for (index, model) in candidates.iter().enumerate() {
            for attempt in 0..per_model {
                attempts += 1;
                let err = match call(model.clone()).await {
                    Ok(value) => {
                        if index > 0 {
                            info!(model = %model, primary = %primary, "Fallback model succeeded");
                        }
                        return Ok(value);
                    }
                    Err(err) => err,
                };

                let kind = err.failure_kind();
                if kind == FailureKind::RateLimited && attempt + 1 < per_model {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        model = %model,
                        attempt = attempt + 1,
                        max_retries = per_model,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Rate limited, backing off"
                    );
                    last_error = Some(err);
                    tokio::time::sleep(delay).await;
                    continue;
                }

                warn!(
                    model = %model,
                    attempt = attempt + 1,
                    kind = %kind,
                    error = %err,
                    "Abandoning model"
                );
                last_error = Some(err);
                break;
            }
        }

        let (kind, message) = match last_error {
            Some(err) => (err.failure_kind(), err.to_string()),
            None => (FailureKind::Other, "no candidate models".to_string()),
        };
        Err(ApiError::FallbackExhausted {
            attempts,
            kind,
            message,
        })
    }

    /// Full completion with retry and fallback. Returns the text and the model used.
    pub async fn complete(
        &self,
        client: &dyn ModelProviderClient,
        prompt: &str,
        primary: &str,
        fallbacks: &[String],
    ) -> Result<(String, String), ApiError> {
        self.run(primary, fallbacks, |model| async move {
            let text = client.complete(prompt, &model).await?;
            Ok((text, model))
        })
        .await
    }

    /// Open a fragment stream with retry and fallback. Failures after the first
    /// fragment belong to the consumer.
    pub async fn open_stream(
        &self,
        client: &dyn ModelProviderClient,
        prompt: &str,
        primary: &str,
        fallbacks: &[String],
    ) -> Result<(String, CompletionStream), ApiError> {
        self.run(primary, fallbacks, |model| async move {
            let stream = client.stream(prompt, &model).await?;
            Ok((model, stream))
        })
        .await
    }
}
