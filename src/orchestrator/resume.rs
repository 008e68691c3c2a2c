//! Resuming a suspended conversation with answers.

use super::{Flow, FlowOutcome, Phase};
use crate::error::ApiError;
use crate::prompt;
use crate::request::MessageRequest;
use tracing::info;

impl Flow<'_> {
    /// Fold answers into the session, then run the generation pipeline.
    pub(super) async fn resume(&mut self, request: &MessageRequest) -> Result<FlowOutcome, ApiError> {
        let session = self.inner.sessions.get_or_create(&self.session_id);
        let resolved = request.resolve(
            &session.question_options,
            session.pending_category_question.as_deref(),
        );
        let catalog = self.inner.catalog.clone();
        let picked = resolved
            .selected_categories
            .iter()
            .find(|key| catalog.is_known(key))
            .cloned();

        let answers = resolved.answers.clone();
        let project_id = request.project_id.clone();
        let chat_id = request.chat_id.clone();
        let extra = request.user_input.clone();
        let session = self.inner.sessions.update(&self.session_id, &mut |session| {
            session.project_id = Some(project_id.clone());
            session.chat_id = Some(chat_id.clone());
            session.questionnaire_answers = answers.clone();
            if let Some(key) = &picked {
                session.category = Some(key.clone());
                session.pending_category_question = None;
            }
            if let Some(extra) = &extra {
                session.collect(extra);
            }
        });
        info!(
            session_id = %self.session_id,
            answers = resolved.answers.len(),
            category = ?session.category,
            "Resuming conversation"
        );

        let profile = session.category.as_deref().and_then(|key| catalog.profile(key));
        let base = prompt::generation_base(
            profile.as_ref(),
            &session.questionnaire_answers,
            session.history.wizard_inputs.as_ref(),
        );
        let request_text = if resolved.prompt.trim().is_empty() {
            session.initial_intent.clone().unwrap_or_default()
        } else {
            resolved.prompt
        };

        self.machine.advance(Phase::Generating)?;
        self.run_generation(&prompt::with_user_request(&base, &request_text))
            .await
    }
}
