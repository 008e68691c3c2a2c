//! Classify-first and chat flows.

use super::{Flow, FlowOutcome, Phase};
use crate::catalog::GENERIC_PAGE_TYPE;
use crate::error::ApiError;
use crate::events::{ErrorScope, Question, QuestionKind, QuestionOption};
use crate::intent::{greeting_response, passes_uncertainty_gate, IntentLabel};
use tracing::info;

const CHAT_PATH: &str = "chat_response";
const CHAT_FALLBACK: &str = "I'm not sure how to answer that. Could you rephrase your question?";

/// Where a build request stands once its page type is known.
pub(super) enum BuildDecision {
    /// Questions went out; the stream has ended with `stream.await_input`.
    Suspended(FlowOutcome),
    Ready(String),
}

/// Where classification left the conversation.
pub(super) enum Classified {
    Finished(FlowOutcome),
    Build(BuildDecision),
}

impl Flow<'_> {
    /// Classify-first flow of a free-text request.
    pub(super) async fn classify(&mut self, user_input: &str) -> Result<FlowOutcome, ApiError> {
        match self.classify_and_branch(user_input).await? {
            Classified::Finished(outcome) => Ok(outcome),
            Classified::Build(BuildDecision::Suspended(outcome)) => Ok(outcome),
            Classified::Build(BuildDecision::Ready(key)) => {
                self.machine.advance(Phase::Completed)?;
                let message = format!("Ready to generate {} project", key);
                self.emitter.message(message.clone())?;
                self.emitter.complete()?;
                Ok(FlowOutcome::Completed {
                    message: Some(message),
                })
            }
        }
    }

    /// Preamble, intent classification and every non-build branch.
    pub(super) async fn classify_and_branch(&mut self, user_input: &str) -> Result<Classified, ApiError> {
        let user_input = user_input.trim();
        self.machine.advance(Phase::Classifying)?;
        self.emitter.message(format!(
            "Analyzing your request: {} (using {})",
            user_input, self.family
        ))?;

        self.emitter.thinking_start()?;
        let intent = self.classifier().intent(user_input).await;
        self.emitter.thinking_end()?;
        self.emitter.message(format!(
            "Intent: {} (confidence: {:.2})",
            intent.value, intent.confidence
        ))?;
        info!(
            session_id = %self.session_id,
            label = %intent.value,
            confidence = intent.confidence,
            degraded = intent.degraded,
            "Classified intent"
        );

        let text = user_input.to_string();
        self.inner.sessions.update(&self.session_id, &mut |session| {
            session.collect(&text);
            if session.history.initial_query.is_none() {
                session.history.initial_query = Some(text.clone());
            }
        });

        let outcome = match intent.value {
            IntentLabel::GreetingOnly => {
                self.machine.advance(Phase::Greeting)?;
                let greeting = greeting_response(user_input);
                self.emitter.message(greeting)?;
                self.complete(Some(greeting.to_string()))?
            }
            IntentLabel::Illegal => {
                self.machine.advance(Phase::Refusing)?;
                let refusal = "Sorry, I can't help with that request.";
                self.emitter.message(refusal)?;
                self.emitter.error(ErrorScope::Model, "Illegal request", None, &[])?;
                self.complete(Some(refusal.to_string()))?
            }
            IntentLabel::Chat => {
                self.machine.advance(Phase::Chatting)?;
                self.chat(user_input).await?
            }
            IntentLabel::Other => {
                self.machine.advance(Phase::Clarifying)?;
                let clarify = "I didn't fully understand, please clarify.";
                self.emitter.message(clarify)?;
                self.emitter
                    .error(ErrorScope::Validation, "Unclear request", None, &[])?;
                self.complete(Some(clarify.to_string()))?
            }
            IntentLabel::WebpageBuild => {
                self.machine.advance(Phase::BuildingArtifact)?;
                return Ok(Classified::Build(self.build(user_input).await?));
            }
        };
        Ok(Classified::Finished(outcome))
    }

    /// Page-type selection and the decision to ask questions.
    async fn build(&mut self, user_input: &str) -> Result<BuildDecision, ApiError> {
        self.emitter
            .message("Determining the best page type for your project...")?;
        self.emitter.thinking_start()?;
        let catalog = self.inner.catalog.clone();
        let page_type = self.classifier().page_type(user_input, catalog.as_ref()).await;
        self.emitter.thinking_end()?;
        let key = page_type.value;
        self.emitter.message(format!("Selected page type: {}", key))?;

        let detail = self.classifier().needs_followup(user_input).await;
        let generic = key == GENERIC_PAGE_TYPE;
        let intent = user_input.to_string();
        let category = (!generic).then(|| key.clone());
        self.inner.sessions.update(&self.session_id, &mut |session| {
            session.initial_intent = Some(intent.clone());
            if category.is_some() {
                session.category = category.clone();
            }
        });
        info!(
            session_id = %self.session_id,
            page_type = %key,
            needs_followup = detail.value,
            "Selected page type"
        );

        if generic {
            self.machine.advance(Phase::AwaitingCategorySelection)?;
            self.emitter
                .message("I need to know what type of page you want to build.")?;
            let options: Vec<QuestionOption> = catalog
                .categories()
                .into_iter()
                .map(|c| QuestionOption {
                    id: c.key,
                    label: c.display_name,
                })
                .collect();
            let question =
                Question::new(QuestionKind::MultiSelect, "Please select a page type").with_options(options.clone());
            let q_id = question.q_id.clone();
            self.inner.sessions.update(&self.session_id, &mut |session| {
                session.remember_options(&q_id, options.clone());
                session.pending_category_question = Some(q_id.clone());
            });
            self.emitter.question(&question)?;
            self.emitter.await_input("suggestion")?;
            return Ok(BuildDecision::Suspended(FlowOutcome::AwaitingInput {
                reason: "suggestion".to_string(),
            }));
        }

        if detail.value {
            if let Some(templates) = catalog.questionnaire(&key) {
                self.machine.advance(Phase::AwaitingQuestionnaire)?;
                self.emitter.message(
                    "I need to gather some additional information to create the perfect page for you.",
                )?;
                let questions: Vec<Question> = templates
                    .iter()
                    .map(|template| {
                        let kind = template.question_kind();
                        let question = Question::new(kind, template.question.clone());
                        if kind.has_options() {
                            question.with_options(
                                template
                                    .options
                                    .iter()
                                    .enumerate()
                                    .map(|(i, label)| QuestionOption {
                                        id: format!("{}_{}", template.id, i + 1),
                                        label: label.clone(),
                                    })
                                    .collect(),
                            )
                        } else {
                            question
                        }
                    })
                    .collect();
                self.inner.sessions.update(&self.session_id, &mut |session| {
                    for question in &questions {
                        session.remember_options(&question.q_id, question.content.options.clone());
                    }
                });
                for question in &questions {
                    self.emitter.question(question)?;
                }
                self.emitter.await_input("questionnaire")?;
                return Ok(BuildDecision::Suspended(FlowOutcome::AwaitingInput {
                    reason: "questionnaire".to_string(),
                }));
            }
        }

        Ok(BuildDecision::Ready(key))
    }

    /// Streamed cheap-model answer.
    pub(super) async fn chat(&mut self, user_input: &str) -> Result<FlowOutcome, ApiError> {
        self.emitter.message("Let me help you with that...")?;
        self.emitter.thinking_start()?;
        let cheap = self.client.cheap_model().to_string();
        let fallbacks = [self.client.default_model().to_string()];
        let (model, fragments) = self.open(user_input, &cheap, &fallbacks).await?;
        let answer = self.relay(fragments, CHAT_PATH).await?;
        self.emitter.thinking_end()?;

        let reply = if passes_uncertainty_gate(&answer) {
            answer.trim().to_string()
        } else {
            info!(model = %model, "Chat answer too short, using fallback reply");
            CHAT_FALLBACK.to_string()
        };
        self.emitter.message(reply.clone())?;
        self.complete(Some(reply))
    }
}
