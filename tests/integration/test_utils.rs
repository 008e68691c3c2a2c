//! Shared test utilities for integration tests
//!
//! A scripted model backend that answers by prompt kind, an orchestrator harness
//! rooted in a temp dir, and isolation of the config directory environment.

use async_trait::async_trait;
use futures::StreamExt;
use kiln::api::KilnApi;
use kiln::artifact::ArtifactStore;
use kiln::error::{ApiError, FailureKind};
use kiln::events::{EventEnvelope, EventLog, EventStream, EventType};
use kiln::orchestrator::Orchestrator;
use kiln::provider::retry::{FallbackController, RetryPolicy};
use kiln::provider::{CompletionStream, FixedProvider, ModelFamily, ModelProviderClient, ModelTiers};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Global mutex to serialize config environment access across all tests
static CONFIG_ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Run `f` with HOME and XDG_CONFIG_HOME pointing into `test_dir`, restoring both after.
pub fn with_config_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let home = std::env::var("HOME").ok();
    let xdg = std::env::var("XDG_CONFIG_HOME").ok();

    let test_home = test_dir.path().join("home");
    let test_config = test_dir.path().join("config");
    std::fs::create_dir_all(&test_home).unwrap();
    std::fs::create_dir_all(&test_config).unwrap();
    std::env::set_var("HOME", &test_home);
    std::env::set_var("XDG_CONFIG_HOME", &test_config);

    let result = f();

    match home {
        Some(v) => std::env::set_var("HOME", v),
        None => std::env::remove_var("HOME"),
    }
    match xdg {
        Some(v) => std::env::set_var("XDG_CONFIG_HOME", v),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }
    result
}

pub const DEFAULT_MODEL: &str = "model-default";
pub const CHEAP_MODEL: &str = "model-cheap";
pub const MEDIUM_MODEL: &str = "model-medium";
pub const HIGH_MODEL: &str = "model-high";

/// Which kind of prompt a call carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Intent,
    PageType,
    Detail,
    Complexity,
    Generation,
    Modification,
    Chat,
}

impl PromptKind {
    fn of(prompt: &str) -> Self {
        if prompt.starts_with("Classify intent.") {
            PromptKind::Intent
        } else if prompt.starts_with("Classify page type.") {
            PromptKind::PageType
        } else if prompt.starts_with("Analyze whether the request needs follow-up") {
            PromptKind::Detail
        } else if prompt.starts_with("Classify modification complexity.") {
            PromptKind::Complexity
        } else if prompt.starts_with("Modify the project JSON.") {
            PromptKind::Modification
        } else if prompt.contains("=== USER REQUEST ===") {
            PromptKind::Generation
        } else {
            PromptKind::Chat
        }
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub kind: PromptKind,
    pub model: String,
    pub streamed: bool,
    pub prompt: String,
}

struct Script {
    intent: String,
    page_type: String,
    needs_followup: bool,
    complexity: String,
    chat: String,
    generation: VecDeque<String>,
    modification: VecDeque<String>,
    /// model -> (failure kind, remaining failures)
    failures: HashMap<String, (FailureKind, u32)>,
}

/// Model backend answering each prompt kind from a script.
pub struct ScriptedProvider {
    tiers: ModelTiers,
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
}

fn verdict(key: &str, value: serde_json::Value) -> String {
    serde_json::json!({ key: value, "explanation": "scripted verdict", "confidence": 0.9 }).to_string()
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            tiers: ModelTiers {
                default: DEFAULT_MODEL.to_string(),
                cheap: CHEAP_MODEL.to_string(),
                medium: MEDIUM_MODEL.to_string(),
                high: HIGH_MODEL.to_string(),
            },
            script: Mutex::new(Script {
                intent: "chat".to_string(),
                page_type: "generic".to_string(),
                needs_followup: false,
                complexity: "medium".to_string(),
                chat: "A webpage is a document served over the web and shown in a browser.".to_string(),
                generation: VecDeque::new(),
                modification: VecDeque::new(),
                failures: HashMap::new(),
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn intent(self, label: &str) -> Self {
        self.script.lock().unwrap().intent = label.to_string();
        self
    }

    pub fn page_type(self, key: &str) -> Self {
        self.script.lock().unwrap().page_type = key.to_string();
        self
    }

    pub fn needs_followup(self, value: bool) -> Self {
        self.script.lock().unwrap().needs_followup = value;
        self
    }

    pub fn complexity(self, value: &str) -> Self {
        self.script.lock().unwrap().complexity = value.to_string();
        self
    }

    pub fn chat(self, answer: &str) -> Self {
        self.script.lock().unwrap().chat = answer.to_string();
        self
    }

    /// Queue a generation output; the last queued output repeats.
    pub fn generation(self, output: impl Into<String>) -> Self {
        self.script.lock().unwrap().generation.push_back(output.into());
        self
    }

    pub fn modification(self, output: impl Into<String>) -> Self {
        self.script.lock().unwrap().modification.push_back(output.into());
        self
    }

    /// Fail the next `times` calls to `model` (`u32::MAX` for always).
    pub fn failing(self, model: &str, kind: FailureKind, times: u32) -> Self {
        self.script
            .lock()
            .unwrap()
            .failures
            .insert(model.to_string(), (kind, times));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: PromptKind) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.kind == kind).collect()
    }

    fn answer(&self, prompt: &str, model: &str, streamed: bool) -> Result<String, ApiError> {
        let kind = PromptKind::of(prompt);
        self.calls.lock().unwrap().push(Call {
            kind,
            model: model.to_string(),
            streamed,
            prompt: prompt.to_string(),
        });

        let mut script = self.script.lock().unwrap();
        if let Some((failure, remaining)) = script.failures.get_mut(model) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                let message = format!("scripted failure for {}", model);
                return Err(match failure {
                    FailureKind::RateLimited => ApiError::ProviderRateLimit(message),
                    FailureKind::NotFound => ApiError::ProviderModelNotFound(message),
                    FailureKind::Other => ApiError::ProviderRequestFailed(message),
                });
            }
        }

        let next = |queue: &mut VecDeque<String>| {
            if queue.len() > 1 {
                queue.pop_front().unwrap_or_default()
            } else {
                queue.front().cloned().unwrap_or_default()
            }
        };
        Ok(match kind {
            PromptKind::Intent => verdict("label", script.intent.clone().into()),
            PromptKind::PageType => verdict("page_type", script.page_type.clone().into()),
            PromptKind::Detail => verdict("needs_followup", script.needs_followup.into()),
            PromptKind::Complexity => verdict("complexity", script.complexity.clone().into()),
            PromptKind::Chat => script.chat.clone(),
            PromptKind::Generation => next(&mut script.generation),
            PromptKind::Modification => next(&mut script.modification),
        })
    }
}

#[async_trait]
impl ModelProviderClient for ScriptedProvider {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, ApiError> {
        self.answer(prompt, model, false)
    }

    async fn stream(&self, prompt: &str, model: &str) -> Result<CompletionStream, ApiError> {
        let text = self.answer(prompt, model, true)?;
        let chars: Vec<char> = text.chars().collect();
        let pieces: Vec<Result<String, ApiError>> = chars
            .chunks(24)
            .map(|c| Ok(c.iter().collect::<String>()))
            .collect();
        Ok(Box::pin(futures::stream::iter(pieces)))
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::Gemini
    }

    fn tiers(&self) -> &ModelTiers {
        &self.tiers
    }
}

/// Retries twice per model with 1ms delays.
pub fn fast_controller() -> FallbackController {
    FallbackController::new(RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
    })
}

/// Orchestrator over a scripted provider, persisting into a temp dir.
pub struct Harness {
    pub dir: TempDir,
    pub provider: Arc<ScriptedProvider>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(provider: ScriptedProvider) -> Self {
        Self::build(provider, false)
    }

    /// Same as [`Harness::new`] with an event log under the output dir.
    pub fn logged(provider: ScriptedProvider) -> Self {
        Self::build(provider, true)
    }

    fn build(provider: ScriptedProvider, logged: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(provider);
        let store = ArtifactStore::new(dir.path().join("output"), dir.path().join("modified_output"));
        let mut builder = Orchestrator::builder(Arc::new(FixedProvider(provider.clone())), store)
            .controller(fast_controller())
            .workspace(dir.path());
        if logged {
            let log = EventLog::open(dir.path().join("output").join("events.jsonl")).unwrap();
            builder = builder.event_log(Arc::new(log));
        }
        Self {
            orchestrator: builder.build().unwrap(),
            provider,
            dir,
        }
    }

    pub fn api(&self) -> KilnApi {
        KilnApi::new(self.orchestrator.clone())
    }

    pub fn output(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    pub fn modified(&self) -> PathBuf {
        self.dir.path().join("modified_output")
    }
}

pub async fn collect(stream: EventStream) -> Vec<EventEnvelope> {
    stream.collect().await
}

pub fn types(events: &[EventEnvelope]) -> Vec<EventType> {
    events.iter().map(|e| e.event_type).collect()
}

pub fn of_type(events: &[EventEnvelope], event_type: EventType) -> Vec<&EventEnvelope> {
    events.iter().filter(|e| e.event_type == event_type).collect()
}

pub fn written_paths(events: &[EventEnvelope]) -> Vec<String> {
    of_type(events, EventType::FsWrite)
        .into_iter()
        .map(|e| e.payload_str("path").unwrap_or_default().to_string())
        .collect()
}

/// Exactly one terminal event, and it is the last.
pub fn assert_single_terminal(events: &[EventEnvelope]) {
    let terminals: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.event_type.is_terminal())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(terminals.len(), 1, "terminals: {:?}", types(events));
    assert_eq!(terminals[0], events.len() - 1);
}

/// A model answer holding a valid project of `files`.
pub fn project_output(name: &str, files: &[(&str, &str)]) -> String {
    let files: serde_json::Map<String, serde_json::Value> = files
        .iter()
        .map(|(path, content)| (path.to_string(), serde_json::Value::from(*content)))
        .collect();
    let body = serde_json::json!({
        "project": {
            "name": name,
            "description": "A generated project used by the integration suite",
            "files": files
        }
    });
    format!("```json\n{}\n```", serde_json::to_string_pretty(&body).unwrap())
}

pub fn demo_project() -> String {
    project_output(
        "demo",
        &[
            ("package.json", "{\"name\": \"demo\", \"private\": true}"),
            ("src/App.tsx", "export default function App() { return <main>Demo</main>; }"),
            ("src/main.tsx", "import App from './App';"),
        ],
    )
}
