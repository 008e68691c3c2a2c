//! Stream orchestration.
//!
//! Every request runs as one tokio task that owns an [`EventEmitter`]. The task
//! picks the flow from the routed [`Action`], drives classifiers, provider streams,
//! the recovery parser and the artifact store, and always finishes the stream with
//! exactly one terminal event: anything escaping a flow, panics included, becomes
//! `error{runtime}` followed by `stream.failed`.

mod classify;
mod generate;
mod modify;
mod resume;
pub mod state;

pub use state::{Phase, PhaseMachine};

use crate::artifact::{Artifact, ArtifactStore, SavedArtifact, MANIFEST_FILE};
use crate::catalog::{Catalog, StaticCatalog};
use crate::config::KilnConfig;
use crate::error::ApiError;
use crate::events::{EventEmitter, EventLog, EventStream, SessionScope};
use crate::intent::Classifier;
use crate::provider::{
    CompletionStream, FallbackController, ModelFamily, ModelProviderClient, ProviderRegistry,
    ProviderResolver, RetryPolicy,
};
use crate::request::{Action, MessageRequest, RoutedRequest, StreamRequest};
use crate::session::{InMemorySessionStore, SessionStore};
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a flow ended, as seen by callers that do not consume events.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    /// Turn finished without persisting anything.
    Completed { message: Option<String> },
    /// Questions were asked; the conversation continues through a resume call.
    AwaitingInput { reason: String },
    Saved {
        artifact: SavedArtifact,
        message: String,
    },
    Failed { message: String },
}

impl FlowOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, FlowOutcome::Failed { .. })
    }
}

enum Job {
    Route(RoutedRequest),
    Resume(MessageRequest),
}

struct Inner {
    providers: Arc<dyn ProviderResolver>,
    sessions: Arc<dyn SessionStore>,
    catalog: Arc<dyn Catalog>,
    store: ArtifactStore,
    controller: FallbackController,
    default_family: ModelFamily,
    workspace: PathBuf,
    event_log: Option<Arc<EventLog>>,
}

/// Entry point for streaming and synchronous orchestration. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

pub struct OrchestratorBuilder {
    providers: Arc<dyn ProviderResolver>,
    store: ArtifactStore,
    sessions: Option<Arc<dyn SessionStore>>,
    catalog: Option<Arc<dyn Catalog>>,
    controller: FallbackController,
    default_family: ModelFamily,
    workspace: PathBuf,
    event_log: Option<Arc<EventLog>>,
}

impl OrchestratorBuilder {
    pub fn sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn controller(mut self, controller: FallbackController) -> Self {
        self.controller = controller;
        self
    }

    pub fn default_family(mut self, family: ModelFamily) -> Self {
        self.default_family = family;
        self
    }

    pub fn workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    pub fn event_log(mut self, log: Arc<EventLog>) -> Self {
        self.event_log = Some(log);
        self
    }

    pub fn build(self) -> Result<Orchestrator, ApiError> {
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(StaticCatalog::builtin()?) as Arc<dyn Catalog>,
        };
        let sessions = self
            .sessions
            .unwrap_or_else(|| Arc::new(InMemorySessionStore::new()));
        Ok(Orchestrator {
            inner: Arc::new(Inner {
                providers: self.providers,
                sessions,
                catalog,
                store: self.store,
                controller: self.controller,
                default_family: self.default_family,
                workspace: self.workspace,
                event_log: self.event_log,
            }),
        })
    }
}

impl Orchestrator {
    pub fn builder(providers: Arc<dyn ProviderResolver>, store: ArtifactStore) -> OrchestratorBuilder {
        OrchestratorBuilder {
            providers,
            store,
            sessions: None,
            catalog: None,
            controller: FallbackController::default(),
            default_family: ModelFamily::default(),
            workspace: PathBuf::from("."),
            event_log: None,
        }
    }

    /// Wire everything from configuration rooted at `workspace`.
    pub fn from_config(config: &KilnConfig, workspace: &Path) -> Result<Self, ApiError> {
        let store = ArtifactStore::new(
            config.storage.output_path(workspace),
            config.storage.modified_path(workspace),
        );
        let catalog_path = config.catalog.path.as_ref().map(|p| workspace.join(p));
        let catalog = StaticCatalog::from_config(catalog_path.as_deref())?;

        let mut builder = Self::builder(
            Arc::new(ProviderRegistry::new(config.providers.clone())),
            store,
        )
        .catalog(Arc::new(catalog))
        .controller(FallbackController::new(RetryPolicy::from(&config.retry)))
        .default_family(config.default_family)
        .workspace(workspace);

        if let Some(path) = config.storage.event_log_path(workspace) {
            builder = builder.event_log(Arc::new(EventLog::open(path)?));
        }
        builder.build()
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.inner.sessions
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.inner.catalog
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.inner.store
    }

    pub fn providers(&self) -> &Arc<dyn ProviderResolver> {
        &self.inner.providers
    }

    pub fn controller(&self) -> &FallbackController {
        &self.inner.controller
    }

    pub fn default_family(&self) -> ModelFamily {
        self.inner.default_family
    }

    pub fn event_log(&self) -> Option<&Arc<EventLog>> {
        self.inner.event_log.as_ref()
    }

    pub fn workspace(&self) -> &Path {
        &self.inner.workspace
    }

    /// Run one unified request. Routing errors are reported on the stream as a
    /// validation error followed by `stream.failed`.
    pub fn stream(&self, request: StreamRequest) -> EventStream {
        let scope = SessionScope::new(request.project_id.clone(), request.session_id.clone());
        match request.route() {
            Ok(routed) => {
                let scope = SessionScope::new(
                    routed.project_id.clone(),
                    Some(routed.session_id.clone()),
                );
                let (emitter, stream) = EventEmitter::channel(scope, self.inner.event_log.clone());
                self.spawn(emitter, Job::Route(routed));
                stream
            }
            Err(err) => {
                warn!(error = %err, "Rejected stream request");
                let (mut emitter, stream) = EventEmitter::channel(scope, self.inner.event_log.clone());
                report_invalid(&mut emitter, &err);
                stream
            }
        }
    }

    /// Answer pending questions and continue into generation. Validation
    /// failures are returned before any stream exists.
    pub fn resume(&self, request: MessageRequest) -> Result<EventStream, ApiError> {
        request.validate()?;
        let scope = SessionScope::new(
            Some(request.project_id.clone()),
            Some(request.chat_id.clone()),
        );
        let (emitter, stream) = EventEmitter::channel(scope, self.inner.event_log.clone());
        self.spawn(emitter, Job::Resume(request));
        Ok(stream)
    }

    /// Run a routed request to completion with events going only to the event log.
    pub async fn run_detached(&self, routed: RoutedRequest) -> FlowOutcome {
        let scope = SessionScope::new(routed.project_id.clone(), Some(routed.session_id.clone()));
        let emitter = EventEmitter::detached(scope, self.inner.event_log.clone());
        self.inner.guarded(emitter, Job::Route(routed)).await
    }

    fn spawn(&self, emitter: EventEmitter, job: Job) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.guarded(emitter, job).await;
        });
    }
}

fn report_invalid(emitter: &mut EventEmitter, err: &ApiError) {
    let message = match err {
        ApiError::InvalidRequest(message) => message.clone(),
        other => other.to_string(),
    };
    let reported = emitter
        .error(crate::events::ErrorScope::Validation, message, None, &[])
        .and_then(|_| emitter.failed());
    if let Err(err) = reported {
        warn!(error = %err, "Could not report invalid request");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("panic: {}", text)
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("panic: {}", text)
    } else {
        "panic in orchestration task".to_string()
    }
}

impl Inner {
    /// Run `job` and make sure the stream ends with one terminal event.
    async fn guarded(&self, mut emitter: EventEmitter, job: Job) -> FlowOutcome {
        let result = AssertUnwindSafe(self.run(&mut emitter, job))
            .catch_unwind()
            .await;

        let failure = match result {
            Ok(Ok(outcome)) if emitter.is_terminated() => return outcome,
            Ok(Ok(_)) => "flow ended without a terminal event".to_string(),
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        error!(
            project_id = ?emitter.scope().project_id,
            conversation_id = ?emitter.scope().conversation_id,
            error = %failure,
            "Stream failed at runtime"
        );
        if let Err(err) = emitter.fail_runtime(&failure) {
            warn!(error = %err, "Could not report runtime failure");
        }
        FlowOutcome::Failed { message: failure }
    }

    async fn run(&self, emitter: &mut EventEmitter, job: Job) -> Result<FlowOutcome, ApiError> {
        match job {
            Job::Route(routed) => {
                let family = routed.model_family.unwrap_or(self.default_family);
                let client = self.providers.resolve(family)?;
                let project_id = routed.project_id.clone();
                self.sessions.update(&routed.session_id, &mut |session| {
                    session.model_family = Some(family);
                    if project_id.is_some() {
                        session.project_id = project_id.clone();
                    }
                });
                info!(
                    session_id = %routed.session_id,
                    action = routed.action.name(),
                    family = %family,
                    "Starting stream"
                );

                let mut flow = Flow::new(self, emitter, routed.session_id, family, client);
                match routed.action {
                    Action::ClassifyIntent { user_input } => flow.classify(&user_input).await,
                    Action::Chat { user_input } => {
                        flow.machine.advance(Phase::Chatting)?;
                        flow.chat(&user_input).await
                    }
                    Action::GenerateArtifact(params) => flow.generate(params).await,
                    Action::ModifyArtifact {
                        instruction,
                        base_reference,
                    } => flow.modify(&instruction, base_reference.as_deref()).await,
                }
            }
            Job::Resume(request) => {
                let session = self.sessions.get_or_create(&request.chat_id);
                let family = session.model_family.unwrap_or(self.default_family);
                let client = self.providers.resolve(family)?;
                let awaiting = if session.pending_category_question.is_some() {
                    Phase::AwaitingCategorySelection
                } else {
                    Phase::AwaitingQuestionnaire
                };
                let mut flow = Flow::new(self, emitter, request.chat_id.clone(), family, client);
                flow.machine = PhaseMachine::starting_at(awaiting);
                flow.resume(&request).await
            }
        }
    }
}

/// State of one running flow.
pub(crate) struct Flow<'a> {
    inner: &'a Inner,
    emitter: &'a mut EventEmitter,
    session_id: String,
    family: ModelFamily,
    client: Arc<dyn ModelProviderClient>,
    machine: PhaseMachine,
}

impl<'a> Flow<'a> {
    fn new(
        inner: &'a Inner,
        emitter: &'a mut EventEmitter,
        session_id: String,
        family: ModelFamily,
        client: Arc<dyn ModelProviderClient>,
    ) -> Self {
        Self {
            inner,
            emitter,
            session_id,
            family,
            client,
            machine: PhaseMachine::new(),
        }
    }

    fn classifier(&self) -> Classifier<'_> {
        Classifier::new(self.client.as_ref(), &self.inner.controller)
    }

    async fn open(
        &self,
        prompt: &str,
        primary: &str,
        fallbacks: &[String],
    ) -> Result<(String, CompletionStream), ApiError> {
        self.inner
            .controller
            .open_stream(self.client.as_ref(), prompt, primary, fallbacks)
            .await
    }

    /// Forward every fragment on the edit timeline of `path`; returns the full text.
    async fn relay(&mut self, mut fragments: CompletionStream, path: &str) -> Result<String, ApiError> {
        let mut output = String::new();
        let mut count = 0usize;
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            if fragment.is_empty() {
                continue;
            }
            self.emitter.edit_chunk(path, &fragment)?;
            output.push_str(&fragment);
            count += 1;
        }
        self.emitter.edit_end(path)?;
        debug!(path, fragments = count, chars = output.len(), "Relayed model output");
        Ok(output)
    }

    /// One `fs.write` for the manifest, then one per file in manifest order.
    fn announce_files(&mut self, artifact: &Artifact) -> Result<(), ApiError> {
        let manifest = artifact
            .manifest_json()
            .map_err(|e| ApiError::GenerationFailed(format!("Failed to serialize manifest: {}", e)))?;
        self.emitter.fs_write(MANIFEST_FILE, Some("json"), Some(&manifest))?;
        for (path, entry) in &artifact.files {
            let language = artifact.language_of(path);
            let content = entry.text();
            self.emitter.fs_write(path, language.as_deref(), Some(&content))?;
        }
        Ok(())
    }

    /// `error{validation}` then `stream.failed`.
    fn reject(
        &mut self,
        message: &str,
        details: Option<&str>,
        actions: &[crate::events::ErrorAction],
    ) -> Result<FlowOutcome, ApiError> {
        self.machine.advance(Phase::Failed)?;
        self.emitter
            .error(crate::events::ErrorScope::Validation, message, details, actions)?;
        self.emitter.failed()?;
        Ok(FlowOutcome::Failed {
            message: message.to_string(),
        })
    }

    fn complete(&mut self, message: Option<String>) -> Result<FlowOutcome, ApiError> {
        self.machine.advance(Phase::Completed)?;
        self.emitter.complete()?;
        Ok(FlowOutcome::Completed { message })
    }
}
