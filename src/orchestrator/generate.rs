//! Fresh builds: category resolution, prompt assembly and the generation pipeline.

use super::classify::{BuildDecision, Classified};
use super::{Flow, FlowOutcome, Phase};
use crate::artifact::Artifact;
use crate::error::ApiError;
use crate::events::{ErrorAction, ProgressMode, ProgressStep, StepStatus};
use crate::provider::ModelProviderClient;
use crate::recovery;
use crate::request::GenerateParams;
use crate::prompt;
use tracing::{info, warn};

pub(super) const GENERATION_PATH: &str = "project_generation";

/// Output shorter than this (trimmed) is not worth parsing.
pub const MIN_OUTPUT_CHARS: usize = 100;

const STEP_PREPARE: &str = "prepare";
const STEP_GENERATE: &str = "generate";
const STEP_PARSE: &str = "parse";
const STEP_SAVE: &str = "save";

fn generation_steps() -> Vec<ProgressStep> {
    vec![
        ProgressStep::pending(STEP_PREPARE, "Preparing"),
        ProgressStep::pending(STEP_GENERATE, "Generating"),
        ProgressStep::pending(STEP_PARSE, "Parsing"),
        ProgressStep::pending(STEP_SAVE, "Saving"),
    ]
}

/// Stronger tiers to fall back on when the default model is unavailable.
pub(super) fn generation_fallbacks(client: &dyn ModelProviderClient) -> Vec<String> {
    let tiers = client.tiers();
    vec![tiers.high.clone(), tiers.medium.clone()]
}

/// Outcome of parsing model output into an artifact.
pub(super) enum Parsed {
    Artifact(Artifact),
    TooShort,
    Invalid(String),
}

pub(super) fn parse_output(output: &str) -> Parsed {
    if output.trim().chars().count() < MIN_OUTPUT_CHARS {
        return Parsed::TooShort;
    }
    match recovery::parse_artifact(output) {
        Ok(artifact) => match artifact.validate_paths() {
            Ok(()) => Parsed::Artifact(artifact),
            Err(reason) => Parsed::Invalid(reason),
        },
        Err(failure) => {
            warn!(
                line = failure.line,
                column = failure.column,
                error_line = %failure.error_line,
                context = %failure.context,
                "Recovery parser found no artifact: {}",
                failure.reason
            );
            Parsed::Invalid(failure.to_string())
        }
    }
}

impl Flow<'_> {
    pub(super) async fn generate(&mut self, params: GenerateParams) -> Result<FlowOutcome, ApiError> {
        let known = self.inner.sessions.get_or_create(&self.session_id).category;
        let mut category = params.page_type_key.clone().or(known);

        if category.is_none() {
            if let Some(text) = params.user_input.as_deref() {
                match self.classify_and_branch(text).await? {
                    Classified::Finished(outcome) => return Ok(outcome),
                    Classified::Build(BuildDecision::Suspended(outcome)) => return Ok(outcome),
                    Classified::Build(BuildDecision::Ready(key)) => category = Some(key),
                }
            }
        }
        let Some(key) = category else {
            return self.reject(
                "page_type_key is required: no page type is known for this session",
                None,
                &[ErrorAction::AskUser],
            );
        };

        let answers = params.questionnaire_answers;
        let wizard = params.wizard_inputs;
        let user_input = params.user_input;
        let session = self.inner.sessions.update(&self.session_id, &mut |session| {
            session.category = Some(key.clone());
            if !answers.is_empty() {
                session.questionnaire_answers = answers.clone();
            }
            if wizard.is_some() {
                session.history.wizard_inputs = wizard.clone();
            }
            if session.initial_intent.is_none() {
                session.initial_intent = user_input.clone();
            }
        });

        let profile = self.inner.catalog.profile(&key);
        if profile.is_none() {
            warn!(page_type = %key, "No profile for page type, generating without one");
        }
        let base = prompt::generation_base(
            profile.as_ref(),
            &session.questionnaire_answers,
            session.history.wizard_inputs.as_ref(),
        );
        let request = user_input
            .or(session.initial_intent)
            .unwrap_or_else(|| {
                let name = self.inner.catalog.display_name(&key).unwrap_or_else(|| key.clone());
                format!("Generate a {} project", name)
            });

        self.machine.advance(Phase::Generating)?;
        self.run_generation(&prompt::with_user_request(&base, &request)).await
    }

    /// Stream, parse and persist a fresh build into the latest slot.
    pub(super) async fn run_generation(&mut self, full_prompt: &str) -> Result<FlowOutcome, ApiError> {
        self.emitter.message("Starting project generation...")?;
        self.emitter
            .progress_init(ProgressMode::Inline, generation_steps())?;
        self.emitter.progress_update(STEP_PREPARE, StepStatus::Completed)?;
        self.emitter.progress_update(STEP_GENERATE, StepStatus::InProgress)?;

        self.emitter.thinking_start()?;
        let primary = self.client.default_model().to_string();
        let fallbacks = generation_fallbacks(self.client.as_ref());
        let (model, fragments) = self.open(full_prompt, &primary, &fallbacks).await?;
        self.emitter.message(format!(
            "Generating project using {} ({})...",
            model, self.family
        ))?;
        let output = self.relay(fragments, GENERATION_PATH).await?;
        self.emitter.thinking_end()?;

        self.emitter.progress_update(STEP_GENERATE, StepStatus::Completed)?;
        self.emitter.progress_update(STEP_PARSE, StepStatus::InProgress)?;
        self.machine.advance(Phase::Parsing)?;

        let artifact = match parse_output(&output) {
            Parsed::Artifact(artifact) => artifact,
            Parsed::TooShort => {
                warn!(model = %model, chars = output.trim().len(), "Model output too short");
                self.emitter.progress_update(STEP_PARSE, StepStatus::Failed)?;
                self.machine.advance(Phase::ParseFailed)?;
                return self.reject("Model returned empty or very short output", None, &[]);
            }
            Parsed::Invalid(reason) => {
                warn!(model = %model, reason = %reason, "Generated output rejected");
                self.emitter.progress_update(STEP_PARSE, StepStatus::Failed)?;
                self.machine.advance(Phase::ParseFailed)?;
                return self.reject(
                    "Failed to parse JSON from model output",
                    Some("The model may have returned invalid JSON or non-JSON content."),
                    &[ErrorAction::Retry, ErrorAction::AskUser],
                );
            }
        };

        self.emitter.progress_update(STEP_PARSE, StepStatus::Completed)?;
        self.emitter.progress_update(STEP_SAVE, StepStatus::InProgress)?;
        self.machine.advance(Phase::Saving)?;
        self.emitter.message(format!(
            "JSON parsed successfully. Project has {} files.",
            artifact.files_count()
        ))?;

        let saved = self.inner.store.save_latest(&artifact)?;
        self.announce_files(&artifact)?;
        self.emitter.progress_update(STEP_SAVE, StepStatus::Completed)?;

        let manifest = saved.manifest_path.clone();
        self.inner.sessions.update(&self.session_id, &mut |session| {
            session.last_artifact = Some(manifest.clone());
        });
        info!(
            session_id = %self.session_id,
            model = %model,
            files = saved.files_count,
            "Generated project"
        );

        let message = "Base project generated successfully!".to_string();
        self.emitter.message(message.clone())?;
        self.machine.advance(Phase::Completed)?;
        self.emitter.complete()?;
        Ok(FlowOutcome::Saved {
            artifact: saved,
            message,
        })
    }
}
