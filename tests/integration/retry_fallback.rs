//! Backoff timing and fallback order against a scripted backend, on paused time.

use super::test_utils::*;
use kiln::error::{ApiError, FailureKind};
use kiln::provider::retry::{FallbackController, RetryPolicy};
use std::time::Duration;

fn controller() -> FallbackController {
    FallbackController::new(RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
    })
}

fn fallbacks() -> Vec<String> {
    vec![HIGH_MODEL.to_string(), MEDIUM_MODEL.to_string()]
}

#[tokio::test(start_paused = true)]
async fn rate_limits_back_off_exponentially_on_one_model() {
    let provider = ScriptedProvider::new()
        .chat("a perfectly reasonable answer")
        .failing(DEFAULT_MODEL, FailureKind::RateLimited, 2);
    let started = tokio::time::Instant::now();

    let (text, model) = controller()
        .complete(&provider, "hello there", DEFAULT_MODEL, &fallbacks())
        .await
        .unwrap();

    assert_eq!(text, "a perfectly reasonable answer");
    assert_eq!(model, DEFAULT_MODEL);
    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(provider.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn persistent_rate_limit_moves_to_the_next_model() {
    let provider = ScriptedProvider::new().failing(DEFAULT_MODEL, FailureKind::RateLimited, u32::MAX);
    let started = tokio::time::Instant::now();

    let (_, model) = controller()
        .complete(&provider, "hello there", DEFAULT_MODEL, &fallbacks())
        .await
        .unwrap();

    assert_eq!(model, HIGH_MODEL);
    let models: Vec<String> = provider.calls().into_iter().map(|c| c.model).collect();
    assert_eq!(models, vec![DEFAULT_MODEL, DEFAULT_MODEL, DEFAULT_MODEL, HIGH_MODEL]);
    // no sleep after the final attempt on a model
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn not_found_abandons_without_waiting() {
    let provider = ScriptedProvider::new().failing(DEFAULT_MODEL, FailureKind::NotFound, u32::MAX);
    let started = tokio::time::Instant::now();

    let (_, model) = controller()
        .complete(&provider, "hello there", DEFAULT_MODEL, &fallbacks())
        .await
        .unwrap();

    assert_eq!(model, HIGH_MODEL);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(provider.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn exhaustion_reports_attempts_and_last_kind() {
    let provider = ScriptedProvider::new()
        .failing(DEFAULT_MODEL, FailureKind::Other, u32::MAX)
        .failing(HIGH_MODEL, FailureKind::Other, u32::MAX)
        .failing(MEDIUM_MODEL, FailureKind::RateLimited, u32::MAX);

    let err = controller()
        .complete(&provider, "hello there", DEFAULT_MODEL, &fallbacks())
        .await
        .unwrap_err();

    match err {
        ApiError::FallbackExhausted { attempts, kind, .. } => {
            assert_eq!(attempts, 5);
            assert_eq!(kind, FailureKind::RateLimited);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn duplicate_candidates_are_tried_once() {
    let provider = ScriptedProvider::new().failing(CHEAP_MODEL, FailureKind::Other, u32::MAX);
    let fallbacks = vec![CHEAP_MODEL.to_string(), DEFAULT_MODEL.to_string()];

    let (_, model) = controller()
        .complete(&provider, "hello there", CHEAP_MODEL, &fallbacks)
        .await
        .unwrap();

    assert_eq!(model, DEFAULT_MODEL);
    let models: Vec<String> = provider.calls().into_iter().map(|c| c.model).collect();
    assert_eq!(models, vec![CHEAP_MODEL, DEFAULT_MODEL]);
}

#[tokio::test(start_paused = true)]
async fn streams_open_with_the_same_policy() {
    use futures::StreamExt;

    let provider = ScriptedProvider::new()
        .chat("streamed words arrive in order")
        .failing(DEFAULT_MODEL, FailureKind::RateLimited, 1);

    let (model, stream) = controller()
        .open_stream(&provider, "hello there", DEFAULT_MODEL, &[])
        .await
        .unwrap();
    let text: Vec<String> = stream.map(|f| f.unwrap()).collect().await;

    assert_eq!(model, DEFAULT_MODEL);
    assert_eq!(text.concat(), "streamed words arrive in order");
    assert!(provider.calls().iter().all(|c| c.streamed));
}
