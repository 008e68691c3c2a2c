//! Modifications of an existing artifact into a new snapshot.

use super::{Flow, FlowOutcome, Phase};
use crate::artifact::Artifact;
use crate::error::ApiError;
use crate::events::ErrorAction;
use crate::prompt;
use crate::recovery;
use crate::session::Modification;
use std::path::PathBuf;
use tracing::{info, warn};

const MODIFICATION_PATH: &str = "project_modification";

fn parse_modification(output: &str) -> Option<Artifact> {
    match recovery::parse_artifact(output) {
        Ok(artifact) => match artifact.validate_paths() {
            Ok(()) => Some(artifact),
            Err(reason) => {
                warn!(reason = %reason, "Modified project has an unsafe path");
                None
            }
        },
        Err(failure) => {
            warn!(line = failure.line, column = failure.column, "Modification output did not parse: {}", failure.reason);
            None
        }
    }
}

impl Flow<'_> {
    /// Base manifest: the explicit reference, else the session's last artifact,
    /// else the store's latest.
    fn resolve_base(&self, reference: Option<&str>) -> Result<PathBuf, String> {
        if let Some(reference) = reference {
            return self
                .inner
                .store
                .resolve_reference(reference, &self.inner.workspace)
                .map_err(|e| format!("Base project not found: {}", e));
        }
        let session = self.inner.sessions.get_or_create(&self.session_id);
        if let Some(path) = session.last_artifact.filter(|path| path.is_file()) {
            return Ok(path);
        }
        match self.inner.store.latest_manifest() {
            Ok(Some(path)) => Ok(path),
            Ok(None) => Err("Base project not found: nothing has been generated yet".to_string()),
            Err(err) => Err(format!("Base project not found: {}", err)),
        }
    }

    pub(super) async fn modify(
        &mut self,
        instruction: &str,
        base_reference: Option<&str>,
    ) -> Result<FlowOutcome, ApiError> {
        self.machine.advance(Phase::Modifying)?;
        let base_path = match self.resolve_base(base_reference) {
            Ok(path) => path,
            Err(reason) => return self.reject(&reason, None, &[ErrorAction::AskUser]),
        };
        let base = match self.inner.store.load(&base_path) {
            Ok(artifact) => artifact,
            Err(err) => {
                return self.reject(&format!("Base project could not be loaded: {}", err), None, &[]);
            }
        };

        let complexity = self.classifier().complexity(instruction).await;
        let model = self.client.model_for_complexity(complexity.value).to_string();
        let default = self.client.default_model().to_string();
        let full_prompt = prompt::modification(&base, instruction)
            .map_err(|e| ApiError::GenerationFailed(format!("Failed to serialize base project: {}", e)))?;
        info!(
            session_id = %self.session_id,
            base = %base_path.display(),
            complexity = %complexity.value,
            model = %model,
            "Modifying project"
        );

        self.emitter.message(format!(
            "Modifying project (complexity: {})...",
            complexity.value
        ))?;
        self.emitter.thinking_start()?;
        self.machine.advance(Phase::Generating)?;
        let (used, fragments) = self
            .open(&full_prompt, &model, std::slice::from_ref(&default))
            .await?;
        let output = self.relay(fragments, MODIFICATION_PATH).await?;
        self.emitter.thinking_end()?;
        self.machine.advance(Phase::Parsing)?;

        let mut parsed = parse_modification(&output);
        if parsed.is_none() && used != default {
            warn!(model = %used, retry_with = %default, "Retrying modification with the default model");
            self.emitter
                .message(format!("Retrying modification with {}...", default))?;
            self.machine.advance(Phase::Generating)?;
            let (_, fragments) = self.open(&full_prompt, &default, &[]).await?;
            let output = self.relay(fragments, MODIFICATION_PATH).await?;
            self.machine.advance(Phase::Parsing)?;
            parsed = parse_modification(&output);
        }

        let Some(artifact) = parsed else {
            self.machine.advance(Phase::ParseFailed)?;
            return self.reject(
                "Invalid modification output",
                None,
                &[ErrorAction::Retry, ErrorAction::AskUser],
            );
        };

        self.machine.advance(Phase::Saving)?;
        let saved = self.inner.store.save_snapshot(&artifact)?;
        let record = Modification {
            instruction: instruction.to_string(),
            from: base_path,
            to: saved.manifest_path.clone(),
        };
        self.inner.sessions.update(&self.session_id, &mut |session| {
            session.last_artifact = Some(record.to.clone());
            session.history.modifications.push(record.clone());
        });
        self.announce_files(&artifact)?;

        let message = format!(
            "Project modified successfully! {} files updated.",
            artifact.files_count()
        );
        self.emitter.message(message.clone())?;
        self.machine.advance(Phase::Completed)?;
        self.emitter.complete()?;
        Ok(FlowOutcome::Saved {
            artifact: saved,
            message,
        })
    }
}
