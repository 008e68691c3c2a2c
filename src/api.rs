//! Synchronous API
//!
//! Request/response operations for callers that cannot consume event streams.
//! Generation and modification run the same flows as the streaming surface with
//! a detached emitter, so their events only reach the event log.

use crate::artifact::Artifact;
use crate::catalog::{Category, QuestionTemplate, GENERIC_PAGE_TYPE};
use crate::error::ApiError;
use crate::intent::{greeting_response, passes_uncertainty_gate, Classification, Classifier, IntentLabel};
use crate::orchestrator::{FlowOutcome, Orchestrator};
use crate::provider::ModelFamily;
use crate::request::{new_session_id, Action, AnswerValue, GenerateParams, RoutedRequest, WizardInputs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentRequest {
    pub user_input: String,
    #[serde(default)]
    pub model_family: Option<ModelFamily>,
}

/// How a classification was reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMeta {
    pub explanation: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub model_family: ModelFamily,
    #[serde(default)]
    pub degraded: bool,
}

impl ClassificationMeta {
    fn from_classification<T>(classification: &Classification<T>, family: ModelFamily) -> Self {
        Self {
            explanation: classification.explanation.clone(),
            confidence: classification.confidence,
            model: classification.model.clone(),
            model_family: family,
            degraded: classification.degraded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResponse {
    pub label: IntentLabel,
    pub meta: ClassificationMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeting_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_type_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_type_meta: Option<ClassificationMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_questionnaire: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_page_type_selection: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub wizard_inputs: WizardInputs,
    #[serde(default)]
    pub model_family: Option<ModelFamily>,
    #[serde(default)]
    pub page_type_key: Option<String>,
    #[serde(default)]
    pub questionnaire_answers: Option<BTreeMap<String, AnswerValue>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModifyRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub instruction: String,
    #[serde(default)]
    pub model_family: Option<ModelFamily>,
    #[serde(default, alias = "base_artifact_reference")]
    pub base_project_path: Option<String>,
}

/// Final state of a generation or modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectResponse {
    pub success: bool,
    /// Exploded tree directory
    pub project_path: String,
    pub project_json_path: String,
    pub files_count: usize,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestResponse {
    pub project_path: String,
    pub project: Artifact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub providers_configured: Vec<ModelFamily>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionnaireResponse {
    pub has_questionnaire: bool,
    pub questionnaire: Option<Vec<QuestionTemplate>>,
}

/// Request/response facade over an [`Orchestrator`].
#[derive(Clone)]
pub struct KilnApi {
    orchestrator: Orchestrator,
}

impl KilnApi {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Intent plus whatever the label calls for: a greeting, a chat answer or the
    /// page-type decision. Illegal requests are refused; unclear ones are invalid.
    pub async fn classify_intent(&self, request: IntentRequest) -> Result<IntentResponse, ApiError> {
        let text = request.user_input.trim();
        if text.is_empty() {
            return Err(ApiError::InvalidRequest("User input cannot be empty".to_string()));
        }
        let family = request
            .model_family
            .unwrap_or_else(|| self.orchestrator.default_family());
        let client = self.orchestrator.providers().resolve(family)?;
        let controller = self.orchestrator.controller();
        let classifier = Classifier::new(client.as_ref(), controller);

        let intent = classifier.intent(text).await;
        info!(label = %intent.value, confidence = intent.confidence, "Classified intent");
        let mut response = IntentResponse {
            label: intent.value,
            meta: ClassificationMeta::from_classification(&intent, family),
            greeting_response: None,
            chat_response: None,
            page_type_key: None,
            page_type_meta: None,
            needs_questionnaire: None,
            needs_page_type_selection: None,
        };

        match intent.value {
            IntentLabel::GreetingOnly => {
                response.greeting_response = Some(greeting_response(text).to_string());
            }
            IntentLabel::Illegal => {
                return Err(ApiError::Refused("Sorry, I can't help with that request.".to_string()));
            }
            IntentLabel::Chat => {
                let cheap = client.cheap_model().to_string();
                let fallbacks = [client.default_model().to_string()];
                let (answer, model) = controller
                    .complete(client.as_ref(), text, &cheap, &fallbacks)
                    .await?;
                response.chat_response = Some(if passes_uncertainty_gate(&answer) {
                    answer.trim().to_string()
                } else {
                    "I'm not sure how to answer that. Could you rephrase your question?".to_string()
                });
                response.meta.model = Some(model);
            }
            IntentLabel::WebpageBuild => {
                let catalog = self.orchestrator.catalog();
                let page_type = classifier.page_type(text, catalog.as_ref()).await;
                let detail = classifier.needs_followup(text).await;
                let key = page_type.value.clone();
                if key == GENERIC_PAGE_TYPE {
                    response.needs_page_type_selection = Some(true);
                } else {
                    response.needs_questionnaire =
                        Some(detail.value && catalog.questionnaire(&key).is_some());
                }
                response.page_type_meta = Some(ClassificationMeta::from_classification(&page_type, family));
                response.page_type_key = Some(key);
            }
            IntentLabel::Other => {
                return Err(ApiError::InvalidRequest(
                    "I didn't fully understand, please clarify.".to_string(),
                ));
            }
        }
        Ok(response)
    }

    pub async fn generate_artifact(&self, request: GenerateRequest) -> Result<ProjectResponse, ApiError> {
        let routed = RoutedRequest {
            session_id: request.session_id.unwrap_or_else(new_session_id),
            model_family: request.model_family,
            project_id: None,
            action: Action::GenerateArtifact(GenerateParams {
                user_input: None,
                page_type_key: request.page_type_key.filter(|k| !k.trim().is_empty()),
                questionnaire_answers: request.questionnaire_answers.unwrap_or_default(),
                wizard_inputs: Some(request.wizard_inputs),
            }),
        };
        let outcome = self.orchestrator.run_detached(routed).await;
        self.project_response(outcome)
    }

    pub async fn modify_artifact(&self, request: ModifyRequest) -> Result<ProjectResponse, ApiError> {
        let instruction = request.instruction.trim();
        if instruction.is_empty() {
            return Err(ApiError::InvalidRequest("instruction is required".to_string()));
        }
        let routed = RoutedRequest {
            session_id: request.session_id.unwrap_or_else(new_session_id),
            model_family: request.model_family,
            project_id: None,
            action: Action::ModifyArtifact {
                instruction: instruction.to_string(),
                base_reference: request.base_project_path.filter(|p| !p.trim().is_empty()),
            },
        };
        let outcome = self.orchestrator.run_detached(routed).await;
        self.project_response(outcome)
    }

    fn project_response(&self, outcome: FlowOutcome) -> Result<ProjectResponse, ApiError> {
        match outcome {
            FlowOutcome::Saved { artifact, message } => Ok(ProjectResponse {
                success: true,
                project_path: artifact.tree_path.display().to_string(),
                project_json_path: artifact.manifest_path.display().to_string(),
                files_count: artifact.files_count,
                message,
                events_file: self
                    .orchestrator
                    .event_log()
                    .map(|log| log.path().display().to_string()),
            }),
            FlowOutcome::Failed { message } => Err(ApiError::GenerationFailed(message)),
            FlowOutcome::Completed { .. } | FlowOutcome::AwaitingInput { .. } => Err(
                ApiError::GenerationFailed("Flow ended without producing a project".to_string()),
            ),
        }
    }

    pub fn latest_artifact(&self) -> Result<LatestResponse, ApiError> {
        match self.orchestrator.store().latest()? {
            Some(latest) => Ok(LatestResponse {
                project_path: latest.manifest_path.display().to_string(),
                project: latest.artifact,
            }),
            None => Err(ApiError::NotFound("No project found".to_string())),
        }
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            providers_configured: self.orchestrator.providers().configured_families(),
        }
    }

    pub fn categories(&self) -> Vec<Category> {
        self.orchestrator.catalog().categories()
    }

    pub fn questionnaire(&self, key: &str) -> Result<QuestionnaireResponse, ApiError> {
        let catalog = self.orchestrator.catalog();
        if !catalog.is_known(key) {
            return Err(ApiError::NotFound(format!("Unknown page type: {}", key)));
        }
        let questionnaire = catalog.questionnaire(key);
        Ok(QuestionnaireResponse {
            has_questionnaire: questionnaire.is_some(),
            questionnaire,
        })
    }
}
