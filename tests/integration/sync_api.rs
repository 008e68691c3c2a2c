//! Request/response surface over the same flows.

use super::test_utils::*;
use kiln::api::{GenerateRequest, IntentRequest, ModifyRequest};
use kiln::error::ApiError;
use kiln::intent::IntentLabel;
use kiln::provider::ModelFamily;

fn intent(text: &str) -> IntentRequest {
    IntentRequest {
        user_input: text.to_string(),
        model_family: None,
    }
}

fn landing_page() -> GenerateRequest {
    GenerateRequest {
        page_type_key: Some("landing_page".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn greeting_gets_a_canned_reply() {
    let h = Harness::new(ScriptedProvider::new().intent("greeting_only"));
    let response = h.api().classify_intent(intent("hello!")).await.unwrap();
    assert_eq!(response.label, IntentLabel::GreetingOnly);
    assert!(response.greeting_response.unwrap().starts_with("Hello!"));
    assert!(response.chat_response.is_none());
}

#[tokio::test]
async fn chat_answers_on_the_cheap_model() {
    let h = Harness::new(
        ScriptedProvider::new()
            .intent("chat")
            .chat("Rust is a systems programming language."),
    );
    let response = h.api().classify_intent(intent("what is rust")).await.unwrap();
    assert_eq!(response.label, IntentLabel::Chat);
    assert_eq!(
        response.chat_response.as_deref(),
        Some("Rust is a systems programming language.")
    );
    assert_eq!(response.meta.model.as_deref(), Some(CHEAP_MODEL));
}

#[tokio::test]
async fn short_chat_answers_are_replaced() {
    let h = Harness::new(ScriptedProvider::new().intent("chat").chat("ok"));
    let response = h.api().classify_intent(intent("what is rust")).await.unwrap();
    assert!(response.chat_response.unwrap().starts_with("I'm not sure"));
}

#[tokio::test]
async fn build_requests_report_the_page_type() {
    let h = Harness::new(
        ScriptedProvider::new()
            .intent("webpage_build")
            .page_type("landing_page")
            .needs_followup(true),
    );
    let response = h
        .api()
        .classify_intent(IntentRequest {
            user_input: "a landing page for my bakery".to_string(),
            model_family: Some(ModelFamily::Claude),
        })
        .await
        .unwrap();
    assert_eq!(response.page_type_key.as_deref(), Some("landing_page"));
    assert_eq!(response.needs_questionnaire, Some(true));
    assert!(response.needs_page_type_selection.is_none());
    assert_eq!(response.meta.model_family, ModelFamily::Claude);
}

#[tokio::test]
async fn generic_build_requests_need_a_selection() {
    let h = Harness::new(ScriptedProvider::new().intent("webpage_build").page_type("generic"));
    let response = h.api().classify_intent(intent("make me a site")).await.unwrap();
    assert_eq!(response.needs_page_type_selection, Some(true));
    assert!(response.needs_questionnaire.is_none());
}

#[tokio::test]
async fn illegal_and_unclear_requests_are_errors() {
    let h = Harness::new(ScriptedProvider::new().intent("illegal"));
    let err = h.api().classify_intent(intent("something bad")).await.unwrap_err();
    assert!(matches!(err, ApiError::Refused(_)));

    let h = Harness::new(ScriptedProvider::new().intent("other"));
    let err = h.api().classify_intent(intent("asdf qwer")).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));
}

#[tokio::test]
async fn empty_input_is_rejected_without_a_model_call() {
    let h = Harness::new(ScriptedProvider::new());
    let err = h.api().classify_intent(intent("   ")).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));
    assert!(h.provider.calls().is_empty());
}

#[tokio::test]
async fn generate_returns_the_saved_project() {
    let h = Harness::new(ScriptedProvider::new().generation(demo_project()));
    let response = h.api().generate_artifact(landing_page()).await.unwrap();

    assert!(response.success);
    assert_eq!(response.files_count, 3);
    assert!(response.project_json_path.ends_with("project.json"));
    assert!(std::path::Path::new(&response.project_path).join("src/App.tsx").is_file());
    assert!(response.events_file.is_none());
}

#[tokio::test]
async fn generate_failure_is_a_generation_error() {
    let h = Harness::new(ScriptedProvider::new().generation("I cannot produce that."));
    let err = h.api().generate_artifact(landing_page()).await.unwrap_err();
    assert!(matches!(err, ApiError::GenerationFailed(_)));
    assert!(!h.output().join("project.json").exists());
}

#[tokio::test]
async fn generate_reports_the_event_log() {
    let h = Harness::logged(ScriptedProvider::new().generation(demo_project()));
    let response = h.api().generate_artifact(landing_page()).await.unwrap();
    let events_file = response.events_file.unwrap();
    assert!(events_file.ends_with("events.jsonl"));
    assert!(!std::fs::read_to_string(events_file).unwrap().is_empty());
}

#[tokio::test]
async fn modify_snapshots_the_latest_project() {
    let h = Harness::new(
        ScriptedProvider::new()
            .generation(demo_project())
            .complexity("medium")
            .modification(demo_project()),
    );
    let api = h.api();
    api.generate_artifact(landing_page()).await.unwrap();

    let response = api
        .modify_artifact(ModifyRequest {
            instruction: "add a footer".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(response.project_json_path.starts_with(h.modified().to_str().unwrap()));
    assert_eq!(h.provider.calls_of(PromptKind::Modification)[0].model, MEDIUM_MODEL);

    let latest = api.latest_artifact().unwrap();
    assert_eq!(latest.project_path, response.project_json_path);
}

#[tokio::test]
async fn modify_requires_an_instruction() {
    let h = Harness::new(ScriptedProvider::new());
    let err = h
        .api()
        .modify_artifact(ModifyRequest {
            instruction: "  ".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));
}

#[tokio::test]
async fn latest_is_not_found_before_any_generation() {
    let h = Harness::new(ScriptedProvider::new().generation(demo_project()));
    assert!(matches!(h.api().latest_artifact(), Err(ApiError::NotFound(_))));

    h.api().generate_artifact(landing_page()).await.unwrap();
    let latest = h.api().latest_artifact().unwrap();
    assert_eq!(latest.project.files_count(), 3);
}

#[test]
fn health_and_catalog_lookups() {
    let h = Harness::new(ScriptedProvider::new());
    let api = h.api();

    let health = api.health();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.providers_configured.len(), ModelFamily::ALL.len());

    assert!(api.categories().iter().any(|c| c.key == "landing_page"));
    let questionnaire = api.questionnaire("landing_page").unwrap();
    assert!(questionnaire.has_questionnaire);
    assert!(matches!(api.questionnaire("spaceship"), Err(ApiError::NotFound(_))));
}
