//! Suspending on questions and resuming with answers.

use super::test_utils::*;
use kiln::error::ApiError;
use kiln::events::{EventEnvelope, EventType};
use kiln::request::{AnswerValue, MessageRequest, QuestionResponse, ResponseContent, StreamRequest};

fn first_question(events: &[EventEnvelope]) -> (String, String) {
    let question = of_type(events, EventType::ChatQuestion)[0];
    (
        question.payload_str("q_id").unwrap().to_string(),
        question.payload_str("label").unwrap().to_string(),
    )
}

fn pick_many(q_id: &str, label: &str, ids: &[&str]) -> QuestionResponse {
    QuestionResponse {
        q_id: q_id.to_string(),
        q_type: "multi_select".to_string(),
        content: ResponseContent {
            label: label.to_string(),
            selected_options: Some(ids.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        },
        skipped: false,
    }
}

fn pick_one(q_id: &str, label: &str, id: &str) -> QuestionResponse {
    QuestionResponse {
        q_id: q_id.to_string(),
        q_type: "mcq".to_string(),
        content: ResponseContent {
            label: label.to_string(),
            selected_option: Some(id.to_string()),
            ..Default::default()
        },
        skipped: false,
    }
}

fn message(session: &str, responses: Vec<QuestionResponse>) -> MessageRequest {
    MessageRequest {
        project_id: "p-1".to_string(),
        chat_id: session.to_string(),
        responses,
        user_input: None,
    }
}

async fn suspend(h: &Harness, session: &str, text: &str) -> Vec<EventEnvelope> {
    collect(h.orchestrator.stream(StreamRequest {
        session_id: Some(session.to_string()),
        project_id: Some("p-1".to_string()),
        user_input: Some(text.to_string()),
        ..Default::default()
    }))
    .await
}

#[tokio::test]
async fn category_selection_resumes_into_generation() {
    let h = Harness::new(
        ScriptedProvider::new()
            .intent("webpage_build")
            .page_type("generic")
            .generation(demo_project()),
    );
    let events = suspend(&h, "s-cat", "build me something nice").await;
    let (q_id, label) = first_question(&events);

    let stream = h
        .orchestrator
        .resume(message("s-cat", vec![pick_many(&q_id, &label, &["landing_page"])]))
        .unwrap();
    let resumed = collect(stream).await;

    assert_single_terminal(&resumed);
    assert_eq!(resumed.last().unwrap().event_type, EventType::StreamComplete);
    assert!(resumed.iter().all(|e| e.conversation_id.as_deref() == Some("s-cat")));
    assert!(resumed.iter().all(|e| e.project_id.as_deref() == Some("p-1")));
    assert!(h.output().join("project.json").is_file());

    let session = h.orchestrator.sessions().get("s-cat").unwrap();
    assert_eq!(session.category.as_deref(), Some("landing_page"));
    assert!(session.pending_category_question.is_none());
    assert_eq!(
        session.questionnaire_answers.get(&q_id),
        Some(&AnswerValue::List(vec!["landing_page".to_string()]))
    );

    let prompt = &h.provider.calls_of(PromptKind::Generation)[0].prompt;
    assert!(prompt.contains("=== PAGE TYPE:"));
    assert!(prompt.contains("Please select a page type: Landing Page / Marketing"));
}

#[tokio::test]
async fn questionnaire_answers_render_as_labels() {
    let h = Harness::new(
        ScriptedProvider::new()
            .intent("webpage_build")
            .page_type("landing_page")
            .needs_followup(true)
            .generation(demo_project()),
    );
    let events = suspend(&h, "s-qa", "a landing page").await;
    let questions = of_type(&events, EventType::ChatQuestion);
    let first = questions[0];
    let q_id = first.payload_str("q_id").unwrap();
    let label = first.payload_str("label").unwrap();
    let option_label = first.payload["content"]["options"][1]["label"].as_str().unwrap().to_string();
    let option_id = first.payload["content"]["options"][1]["id"].as_str().unwrap().to_string();

    let mut skipped = pick_one(
        questions[1].payload_str("q_id").unwrap(),
        questions[1].payload_str("label").unwrap(),
        "",
    );
    skipped.content.selected_option = None;
    skipped.skipped = true;

    let stream = h
        .orchestrator
        .resume(message("s-qa", vec![pick_one(q_id, label, &option_id), skipped]))
        .unwrap();
    let resumed = collect(stream).await;
    assert_eq!(resumed.last().unwrap().event_type, EventType::StreamComplete);

    let session = h.orchestrator.sessions().get("s-qa").unwrap();
    assert_eq!(session.questionnaire_answers.len(), 1, "skipped answers are not stored");
    assert_eq!(
        session.questionnaire_answers.get(q_id),
        Some(&AnswerValue::Text(option_id.clone()))
    );
    let prompt = &h.provider.calls_of(PromptKind::Generation)[0].prompt;
    assert!(prompt.contains(&format!("{}: {}", label, option_label)));
}

#[tokio::test]
async fn extra_text_is_appended_as_requirements() {
    let h = Harness::new(
        ScriptedProvider::new()
            .intent("webpage_build")
            .page_type("generic")
            .generation(demo_project()),
    );
    let events = suspend(&h, "s-extra", "build a site").await;
    let (q_id, label) = first_question(&events);
    let mut request = message("s-extra", vec![pick_many(&q_id, &label, &["ecommerce"])]);
    request.user_input = Some("dark theme please".to_string());

    collect(h.orchestrator.resume(request).unwrap()).await;
    let prompt = &h.provider.calls_of(PromptKind::Generation)[0].prompt;
    assert!(prompt.contains("Additional requirements: dark theme please"));
}

#[tokio::test]
async fn malformed_answers_are_rejected_before_streaming() {
    let h = Harness::new(ScriptedProvider::new());

    let open = QuestionResponse {
        q_id: "q_1".to_string(),
        q_type: "open_ended".to_string(),
        content: ResponseContent {
            answer: Some("text".to_string()),
            ..Default::default()
        },
        skipped: false,
    };
    let mixed = message("s-bad", vec![open, pick_one("q_2", "Style", "a")]);
    assert!(matches!(h.orchestrator.resume(mixed), Err(ApiError::InvalidRequest(_))));

    let mut wrong_field = pick_one("q_3", "Style", "a");
    wrong_field.q_type = "multi_select".to_string();
    assert!(matches!(
        h.orchestrator.resume(message("s-bad", vec![wrong_field])),
        Err(ApiError::InvalidRequest(_))
    ));

    let no_chat = message("", vec![pick_one("q_4", "Style", "a")]);
    assert!(matches!(h.orchestrator.resume(no_chat), Err(ApiError::InvalidRequest(_))));
    assert!(h.provider.calls().is_empty());
}

#[tokio::test]
async fn resumed_generation_failure_still_terminates_once() {
    let h = Harness::new(
        ScriptedProvider::new()
            .intent("webpage_build")
            .page_type("generic")
            .generation("{}"),
    );
    let events = suspend(&h, "s-fail", "build something").await;
    let (q_id, label) = first_question(&events);
    let resumed = collect(
        h.orchestrator
            .resume(message("s-fail", vec![pick_many(&q_id, &label, &["hr_portal"])]))
            .unwrap(),
    )
    .await;
    assert_single_terminal(&resumed);
    assert_eq!(resumed.last().unwrap().event_type, EventType::StreamFailed);
}
