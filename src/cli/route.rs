//! CLI route: single route table and run context. Dispatches to the engine and presentation.

use crate::api::{GenerateRequest, IntentRequest, KilnApi, ModifyRequest};
use crate::cli::interactive::run_chat;
use crate::cli::parse::{Commands, ConfigCommands, FrameFormat};
use crate::cli::presentation::{
    format_categories, format_events, format_health, format_intent, format_latest,
    format_project, format_questionnaire,
};
use crate::cli::serve::{pump_frames, serve};
use crate::cli::{command_name, writes_frames};
use crate::config::{ConfigLoader, KilnConfig};
use crate::error::{ApiError, StorageError};
use crate::events::EventLog;
use crate::orchestrator::Orchestrator;
use crate::request::{AnswerValue, MessageRequest, StreamRequest, WizardInputs};
use anyhow::Context;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Runtime context for CLI execution: workspace, effective config, engine facade
/// and the async runtime commands block on.
pub struct RunContext {
    api: KilnApi,
    workspace_root: PathBuf,
    config: KilnConfig,
    runtime: Runtime,
}

impl RunContext {
    pub fn api(&self) -> &KilnApi {
        &self.api
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };

        let runtime = Runtime::new()
            .map_err(|e| ApiError::ConfigError(format!("Failed to start async runtime: {}", e)))?;
        let orchestrator = Orchestrator::from_config(&config, &workspace_root)?;

        Ok(Self {
            api: KilnApi::new(orchestrator),
            workspace_root,
            config,
            runtime,
        })
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let name = command_name(command);
        let result = self.execute_inner(command);
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(command = name, duration_ms, "Command finished"),
            Err(e) => warn!(command = name, duration_ms, error = %e, "Command failed"),
        }
        if writes_frames(command) {
            if let Ok(terminal) = &result {
                debug!(command = name, terminal = %terminal, "Frames written");
            }
            return result.map(|_| String::new());
        }
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Stream {
                request,
                input,
                session,
                family,
                page_type,
                instruction,
                base,
                project_id,
                chat,
                format,
            } => {
                let request = match request {
                    Some(path) => read_request::<StreamRequest>(path)?,
                    None => StreamRequest {
                        session_id: session.clone(),
                        model_family: *family,
                        user_input: input.clone(),
                        page_type_key: page_type.clone(),
                        base_project_path: base.clone(),
                        instruction: instruction.clone(),
                        project_id: project_id.clone(),
                        action: chat.then(|| "chat".to_string()),
                        ..Default::default()
                    },
                };
                self.handle_stream(request, *format)
            }
            Commands::Answer { request, format } => {
                let request = read_request::<MessageRequest>(request)?;
                self.handle_answer(request, *format)
            }
            Commands::Serve { format } => {
                let handled = self.runtime.block_on(serve(&self.api, *format))?;
                Ok(format!("{} operation(s) served", handled))
            }
            Commands::Classify { text, family, format } => {
                let request = IntentRequest {
                    user_input: text.clone(),
                    model_family: *family,
                };
                let response = self.runtime.block_on(self.api.classify_intent(request))?;
                format_intent(&response, format)
            }
            Commands::Generate {
                page_type,
                answers,
                hero_text,
                subtext,
                cta,
                theme,
                session,
                family,
                format,
            } => {
                let mut wizard = WizardInputs {
                    hero_text: hero_text.clone(),
                    subtext: subtext.clone(),
                    ..Default::default()
                };
                if let Some(cta) = cta {
                    wizard.cta = cta.clone();
                }
                if let Some(theme) = theme {
                    wizard.theme = theme.clone();
                }
                let questionnaire_answers = answers
                    .as_deref()
                    .map(read_request::<BTreeMap<String, AnswerValue>>)
                    .transpose()?;
                let request = GenerateRequest {
                    session_id: session.clone(),
                    wizard_inputs: wizard,
                    model_family: *family,
                    page_type_key: page_type.clone(),
                    questionnaire_answers,
                };
                let response = self.runtime.block_on(self.api.generate_artifact(request))?;
                format_project(&response, format)
            }
            Commands::Modify {
                instruction,
                base,
                session,
                family,
                format,
            } => {
                let request = ModifyRequest {
                    session_id: session.clone(),
                    instruction: instruction.clone(),
                    model_family: *family,
                    base_project_path: base.clone(),
                };
                let response = self.runtime.block_on(self.api.modify_artifact(request))?;
                format_project(&response, format)
            }
            Commands::Latest { format } => format_latest(&self.api.latest_artifact()?, format),
            Commands::Health { format } => format_health(&self.api.health(), format),
            Commands::Categories { format } => format_categories(&self.api.categories(), format),
            Commands::Questionnaire { key, format } => {
                format_questionnaire(key, &self.api.questionnaire(key)?, format)
            }
            Commands::Events {
                event_type,
                session,
                limit,
                format,
            } => self.handle_events(event_type.as_deref(), session.as_deref(), *limit, format),
            Commands::Chat { family, project_id } => {
                run_chat(&self.runtime, &self.api, *family, project_id.clone())
            }
            Commands::Config { command } => match command {
                ConfigCommands::Show => self.handle_config_show(),
            },
        }
    }

    fn handle_events(
        &self,
        event_type: Option<&str>,
        session: Option<&str>,
        limit: Option<usize>,
        format: &str,
    ) -> Result<String, ApiError> {
        let path = self
            .config
            .storage
            .event_log_path(&self.workspace_root)
            .ok_or_else(|| ApiError::NotFound("event log is disabled (storage.event_log)".to_string()))?;
        if !path.is_file() {
            return Err(ApiError::NotFound(format!("no event log at {}", path.display())));
        }
        let events = EventLog::query(&path, event_type, session, limit)?;
        debug!(path = %path.display(), events = events.len(), "Read event log");
        format_events(&events, format)
    }

    /// Frames go straight to stdout; the returned string names the terminal event.
    fn handle_stream(&self, request: StreamRequest, format: FrameFormat) -> Result<String, ApiError> {
        let orchestrator = self.api.orchestrator();
        let terminal = self
            .runtime
            .block_on(async { pump_frames(orchestrator.stream(request), format).await })?;
        Ok(terminal.map(|t| t.to_string()).unwrap_or_default())
    }

    fn handle_answer(&self, request: MessageRequest, format: FrameFormat) -> Result<String, ApiError> {
        let orchestrator = self.api.orchestrator();
        let terminal = self.runtime.block_on(async {
            let stream = orchestrator.resume(request)?;
            pump_frames(stream, format).await
        })?;
        Ok(terminal.map(|t| t.to_string()).unwrap_or_default())
    }

    fn handle_config_show(&self) -> Result<String, ApiError> {
        let mut config = self.config.clone();
        for settings in [
            &mut config.providers.gemini,
            &mut config.providers.openai,
            &mut config.providers.anthropic,
        ] {
            if settings.api_key.is_some() {
                settings.api_key = Some("***".to_string());
            }
        }
        toml::to_string_pretty(&config)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render configuration: {}", e)))
    }
}

/// Read a JSON document from a file, or from stdin when the path is `-`.
fn read_request<T: DeserializeOwned>(path: &Path) -> Result<T, ApiError> {
    let load = || -> anyhow::Result<T> {
        let text = if path == Path::new("-") {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read request from stdin")?;
            text
        } else {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?
        };
        serde_json::from_str(&text).with_context(|| format!("{} is not a valid request", path.display()))
    };
    load().map_err(|e| match e.downcast_ref::<std::io::Error>() {
        Some(io) if io.kind() == std::io::ErrorKind::NotFound => {
            ApiError::StorageError(StorageError::ArtifactNotFound(path.to_path_buf()))
        }
        _ => ApiError::InvalidRequest(format!("{:#}", e)),
    })
}
