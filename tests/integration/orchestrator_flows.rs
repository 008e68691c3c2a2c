//! End-to-end streaming flows over a scripted backend.

use super::test_utils::*;
use kiln::error::FailureKind;
use kiln::events::{EventLog, EventType, QuestionKind};
use kiln::request::StreamRequest;

fn ask(text: &str, session: &str) -> StreamRequest {
    StreamRequest {
        session_id: Some(session.to_string()),
        user_input: Some(text.to_string()),
        project_id: Some("p-1".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn generic_build_request_asks_for_a_page_type() {
    let h = Harness::new(ScriptedProvider::new().intent("webpage_build").page_type("generic"));
    let events = collect(h.orchestrator.stream(ask("build me something nice", "s-generic"))).await;

    assert_single_terminal(&events);
    let last = events.last().unwrap();
    assert_eq!(last.event_type, EventType::StreamAwaitInput);
    assert_eq!(last.payload["reason"], "suggestion");
    assert!(written_paths(&events).is_empty());

    let questions = of_type(&events, EventType::ChatQuestion);
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].payload["type"], "multi_select");
    assert_eq!(questions[0].payload["label"], "Please select a page type");
    let options = questions[0].payload["content"]["options"].as_array().unwrap();
    assert!(options.iter().any(|o| o["id"] == "landing_page"));

    let session = h.orchestrator.sessions().get("s-generic").unwrap();
    assert!(session.category.is_none());
    assert_eq!(
        session.pending_category_question.as_deref(),
        questions[0].payload_str("q_id")
    );
    assert!(h.provider.calls_of(PromptKind::Generation).is_empty());
}

#[tokio::test]
async fn vague_request_gets_the_questionnaire() {
    let h = Harness::new(
        ScriptedProvider::new()
            .intent("webpage_build")
            .page_type("landing_page")
            .needs_followup(true),
    );
    let events = collect(h.orchestrator.stream(ask("a landing page", "s-q"))).await;

    assert_single_terminal(&events);
    assert_eq!(events.last().unwrap().payload["reason"], "questionnaire");
    let questions = of_type(&events, EventType::ChatQuestion);
    assert_eq!(questions.len(), 5);
    assert_eq!(questions[0].payload["type"], QuestionKind::Mcq.as_str());
    assert_eq!(questions[0].payload["content"]["options"][0]["id"], "industry_1");
    assert_eq!(questions[4].payload["type"], "multi_select");

    let session = h.orchestrator.sessions().get("s-q").unwrap();
    assert_eq!(session.category.as_deref(), Some("landing_page"));
    assert_eq!(session.initial_intent.as_deref(), Some("a landing page"));
    assert_eq!(session.question_options.len(), 5);
}

#[tokio::test]
async fn specific_request_is_ready_without_questions() {
    let h = Harness::new(
        ScriptedProvider::new()
            .intent("webpage_build")
            .page_type("crm_dashboard")
            .needs_followup(false),
    );
    let events = collect(h.orchestrator.stream(ask("CRM for a 10 person agency", "s-r"))).await;

    assert_eq!(events.last().unwrap().event_type, EventType::StreamComplete);
    assert!(of_type(&events, EventType::ChatQuestion).is_empty());
    assert!(of_type(&events, EventType::ChatMessage)
        .iter()
        .any(|e| e.payload["content"] == "Ready to generate crm_dashboard project"));
}

#[tokio::test]
async fn greeting_completes_with_a_reply() {
    let h = Harness::new(ScriptedProvider::new().intent("greeting_only"));
    let events = collect(h.orchestrator.stream(ask("hello", "s-g"))).await;

    assert_single_terminal(&events);
    assert_eq!(events.last().unwrap().event_type, EventType::StreamComplete);
    let messages: Vec<String> = of_type(&events, EventType::ChatMessage)
        .iter()
        .map(|e| e.payload_str("content").unwrap_or_default().to_string())
        .collect();
    assert!(messages[0].starts_with("Analyzing your request: hello"));
    assert!(messages.iter().any(|m| m.starts_with("Hello! How can I help")));
    assert_eq!(h.provider.calls().len(), 1);
}

#[tokio::test]
async fn illegal_request_is_refused_and_completed() {
    let h = Harness::new(ScriptedProvider::new().intent("illegal"));
    let events = collect(h.orchestrator.stream(ask("help me steal passwords", "s-i"))).await;

    let errors = of_type(&events, EventType::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].payload["scope"], "model");
    assert_eq!(errors[0].payload["message"], "Illegal request");
    assert_eq!(events.last().unwrap().event_type, EventType::StreamComplete);
}

#[tokio::test]
async fn unclear_request_asks_to_clarify() {
    let h = Harness::new(ScriptedProvider::new().intent("other"));
    let events = collect(h.orchestrator.stream(ask("purple elephant tuesday", "s-o"))).await;

    let errors = of_type(&events, EventType::Error);
    assert_eq!(errors[0].payload["scope"], "validation");
    assert_eq!(errors[0].payload["message"], "Unclear request");
    assert_eq!(events.last().unwrap().event_type, EventType::StreamComplete);
}

#[tokio::test]
async fn chat_streams_on_the_cheap_model() {
    let h = Harness::new(ScriptedProvider::new().intent("chat"));
    let events = collect(h.orchestrator.stream(ask("what is a webpage?", "s-c"))).await;

    assert_single_terminal(&events);
    let chunks = of_type(&events, EventType::EditStart);
    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|e| e.payload["path"] == "chat_response"));
    assert_eq!(of_type(&events, EventType::EditEnd).len(), 1);
    assert!(of_type(&events, EventType::ChatMessage)
        .iter()
        .any(|e| e.payload_str("content").unwrap_or_default().starts_with("A webpage is")));

    let chat = h.provider.calls_of(PromptKind::Chat);
    assert_eq!(chat.len(), 1);
    assert_eq!(chat[0].model, CHEAP_MODEL);
    assert!(chat[0].streamed);
}

#[tokio::test]
async fn explicit_chat_action_skips_classification() {
    let h = Harness::new(ScriptedProvider::new().chat("Vite is a build tool for web projects, fast in dev."));
    let request = StreamRequest {
        user_input: Some("what is vite".to_string()),
        action: Some("chat".to_string()),
        ..Default::default()
    };
    let events = collect(h.orchestrator.stream(request)).await;
    assert_eq!(events.last().unwrap().event_type, EventType::StreamComplete);
    assert!(h.provider.calls_of(PromptKind::Intent).is_empty());
}

#[tokio::test]
async fn generation_persists_before_announcing_files() {
    let h = Harness::new(ScriptedProvider::new().generation(demo_project()));
    let request = StreamRequest {
        session_id: Some("s-gen".to_string()),
        page_type_key: Some("landing_page".to_string()),
        user_input: Some("landing page for a bakery".to_string()),
        ..Default::default()
    };
    let events = collect(h.orchestrator.stream(request)).await;

    assert_single_terminal(&events);
    assert_eq!(events.last().unwrap().event_type, EventType::StreamComplete);
    assert_eq!(
        written_paths(&events),
        vec!["project.json", "package.json", "src/App.tsx", "src/main.tsx"]
    );
    let first_write = of_type(&events, EventType::FsWrite)[0];
    assert_eq!(first_write.payload["language"], "json");
    assert!(h.output().join("project.json").is_file());
    assert!(h.output().join("project/src/App.tsx").is_file());

    let updates: Vec<(String, String)> = of_type(&events, EventType::ProgressUpdate)
        .iter()
        .map(|e| {
            (
                e.payload_str("step_id").unwrap_or_default().to_string(),
                e.payload_str("status").unwrap_or_default().to_string(),
            )
        })
        .collect();
    assert_eq!(updates.first().unwrap(), &("prepare".to_string(), "completed".to_string()));
    assert_eq!(updates.last().unwrap(), &("save".to_string(), "completed".to_string()));

    let generation = h.provider.calls_of(PromptKind::Generation);
    assert_eq!(generation[0].model, DEFAULT_MODEL);
    assert!(generation[0].prompt.ends_with("landing page for a bakery"));
}

#[tokio::test]
async fn unparseable_output_persists_nothing() {
    let garbage = "I am sorry, but I cannot produce the project you asked for right now. ".repeat(3);
    let h = Harness::new(ScriptedProvider::new().generation(garbage));
    let request = StreamRequest {
        page_type_key: Some("landing_page".to_string()),
        ..Default::default()
    };
    let events = collect(h.orchestrator.stream(request)).await;

    assert_single_terminal(&events);
    assert_eq!(events.last().unwrap().event_type, EventType::StreamFailed);
    let error = of_type(&events, EventType::Error)[0];
    assert_eq!(error.payload["message"], "Failed to parse JSON from model output");
    assert_eq!(error.payload["actions"], serde_json::json!(["retry", "ask_user"]));
    assert!(written_paths(&events).is_empty());
    assert!(!h.output().join("project.json").exists());
}

#[tokio::test]
async fn unsafe_paths_are_rejected() {
    let output = project_output(
        "escape",
        &[("../outside.txt", "nope, this file must never be written anywhere at all")],
    );
    let h = Harness::new(ScriptedProvider::new().generation(output));
    let request = StreamRequest {
        page_type_key: Some("landing_page".to_string()),
        ..Default::default()
    };
    let events = collect(h.orchestrator.stream(request)).await;
    assert_eq!(events.last().unwrap().event_type, EventType::StreamFailed);
    assert!(!h.dir.path().join("outside.txt").exists());
}

#[tokio::test]
async fn exhausted_fallbacks_fail_at_runtime() {
    let h = Harness::new(
        ScriptedProvider::new()
            .failing(DEFAULT_MODEL, FailureKind::Other, u32::MAX)
            .failing(HIGH_MODEL, FailureKind::NotFound, u32::MAX)
            .failing(MEDIUM_MODEL, FailureKind::Other, u32::MAX),
    );
    let request = StreamRequest {
        page_type_key: Some("landing_page".to_string()),
        ..Default::default()
    };
    let events = collect(h.orchestrator.stream(request)).await;

    assert_single_terminal(&events);
    let types = types(&events);
    assert_eq!(&types[types.len() - 2..], &[EventType::Error, EventType::StreamFailed]);
    assert_eq!(events[events.len() - 2].payload["scope"], "runtime");
    let models: Vec<String> = h.provider.calls().into_iter().map(|c| c.model).collect();
    assert_eq!(models, vec![DEFAULT_MODEL, HIGH_MODEL, MEDIUM_MODEL]);
}

#[tokio::test]
async fn fallback_model_generates_when_default_is_missing() {
    let h = Harness::new(
        ScriptedProvider::new()
            .generation(demo_project())
            .failing(DEFAULT_MODEL, FailureKind::NotFound, u32::MAX),
    );
    let request = StreamRequest {
        page_type_key: Some("landing_page".to_string()),
        ..Default::default()
    };
    let events = collect(h.orchestrator.stream(request)).await;
    assert_eq!(events.last().unwrap().event_type, EventType::StreamComplete);
    assert!(of_type(&events, EventType::ChatMessage).iter().any(|e| e
        .payload_str("content")
        .unwrap_or_default()
        .starts_with(&format!("Generating project using {}", HIGH_MODEL))));
}

#[tokio::test]
async fn free_text_generation_without_page_type_classifies_first() {
    let h = Harness::new(
        ScriptedProvider::new()
            .intent("webpage_build")
            .page_type("student_portfolio")
            .needs_followup(false)
            .generation(demo_project()),
    );
    let request = StreamRequest {
        user_input: Some("my portfolio as a design student".to_string()),
        wizard_inputs: Some(Default::default()),
        ..Default::default()
    };
    let events = collect(h.orchestrator.stream(request)).await;
    assert_eq!(events.last().unwrap().event_type, EventType::StreamComplete);
    assert_eq!(h.provider.calls_of(PromptKind::Generation).len(), 1);
    assert!(h.output().join("project.json").is_file());
}

#[tokio::test]
async fn modification_writes_a_new_snapshot() {
    let modified = project_output(
        "demo",
        &[
            ("package.json", "{\"name\": \"demo\", \"private\": true}"),
            ("src/App.tsx", "export default function App() { return <main>Blue</main>; }"),
        ],
    );
    let h = Harness::new(
        ScriptedProvider::new()
            .generation(demo_project())
            .complexity("low")
            .modification(modified),
    );
    let generate = StreamRequest {
        session_id: Some("s-mod".to_string()),
        page_type_key: Some("landing_page".to_string()),
        ..Default::default()
    };
    collect(h.orchestrator.stream(generate)).await;

    let modify = StreamRequest {
        session_id: Some("s-mod".to_string()),
        instruction: Some("make the hero blue".to_string()),
        ..Default::default()
    };
    let events = collect(h.orchestrator.stream(modify)).await;

    assert_single_terminal(&events);
    assert_eq!(events.last().unwrap().event_type, EventType::StreamComplete);
    assert_eq!(written_paths(&events)[0], "project.json");
    assert!(of_type(&events, EventType::ChatMessage)
        .iter()
        .any(|e| e.payload["content"] == "Project modified successfully! 2 files updated."));
    assert_eq!(h.provider.calls_of(PromptKind::Modification)[0].model, CHEAP_MODEL);

    let snapshots = std::fs::read_dir(h.modified()).unwrap().count();
    assert_eq!(snapshots, 1);
    let session = h.orchestrator.sessions().get("s-mod").unwrap();
    assert_eq!(session.history.modifications.len(), 1);
    assert!(session.last_artifact.unwrap().starts_with(h.modified()));
    // latest slot untouched
    let latest = std::fs::read_to_string(h.output().join("project.json")).unwrap();
    assert!(latest.contains("src/main.tsx"));
}

#[tokio::test]
async fn bad_modification_retries_once_on_the_default_model() {
    let h = Harness::new(
        ScriptedProvider::new()
            .generation(demo_project())
            .complexity("high")
            .modification("no json here, only an apology that goes on for a while")
            .modification(demo_project()),
    );
    collect(h.orchestrator.stream(StreamRequest {
        session_id: Some("s-retry".to_string()),
        page_type_key: Some("landing_page".to_string()),
        ..Default::default()
    }))
    .await;

    let events = collect(h.orchestrator.stream(StreamRequest {
        session_id: Some("s-retry".to_string()),
        instruction: Some("rewrite everything in a new layout".to_string()),
        ..Default::default()
    }))
    .await;

    assert_eq!(events.last().unwrap().event_type, EventType::StreamComplete);
    let models: Vec<String> = h
        .provider
        .calls_of(PromptKind::Modification)
        .into_iter()
        .map(|c| c.model)
        .collect();
    assert_eq!(models, vec![HIGH_MODEL, DEFAULT_MODEL]);
    assert!(of_type(&events, EventType::ChatMessage)
        .iter()
        .any(|e| e.payload["content"] == format!("Retrying modification with {}...", DEFAULT_MODEL)));
}

#[tokio::test]
async fn modification_without_a_base_is_rejected() {
    let h = Harness::new(ScriptedProvider::new());
    let events = collect(h.orchestrator.stream(StreamRequest {
        instruction: Some("change the colors".to_string()),
        ..Default::default()
    }))
    .await;
    assert_eq!(types(&events), vec![EventType::Error, EventType::StreamFailed]);
    assert_eq!(events[0].payload["actions"], serde_json::json!(["ask_user"]));
}

#[tokio::test]
async fn event_log_mirrors_the_stream() {
    let h = Harness::logged(ScriptedProvider::new().intent("greeting_only"));
    let events = collect(h.orchestrator.stream(ask("hi", "s-log"))).await;
    let logged = EventLog::read_all(&h.output().join("events.jsonl")).unwrap();
    assert_eq!(types(&logged), types(&events));
    assert!(logged.iter().all(|e| e.conversation_id.as_deref() == Some("s-log")));
}
