//! Inbound request boundary.
//!
//! [`StreamRequest`] is routed once into a closed [`Action`]; the orchestrator never
//! inspects which optional fields were present. [`MessageRequest`] is the answer call
//! that resumes a suspended conversation.

use crate::error::ApiError;
use crate::events::{QuestionKind, QuestionOption};
use crate::provider::ModelFamily;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// `session-<millis>-<seq>`
pub fn new_session_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("session-{}-{}", millis, seq)
}

/// Stored answer for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    List(Vec<String>),
    Fields(BTreeMap<String, FieldValue>),
}

impl AnswerValue {
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Text(text) => text.trim().is_empty(),
            AnswerValue::List(items) => items.is_empty(),
            AnswerValue::Fields(fields) => fields.is_empty(),
        }
    }
}

/// A form field answer: free text or a list of picks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::List(items) => items.join(", "),
        }
    }
}

/// Optional landing-page copy supplied by a wizard front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardInputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtext: Option<String>,
    #[serde(default = "default_cta")]
    pub cta: String,
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_cta() -> String {
    "Get Started".to_string()
}

fn default_theme() -> String {
    "Light".to_string()
}

impl Default for WizardInputs {
    fn default() -> Self {
        Self {
            hero_text: None,
            subtext: None,
            cta: default_cta(),
            theme: default_theme(),
        }
    }
}

/// The unified streaming request. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub model_family: Option<ModelFamily>,
    #[serde(default)]
    pub user_input: Option<String>,
    #[serde(default)]
    pub page_type_key: Option<String>,
    #[serde(default)]
    pub questionnaire_answers: Option<BTreeMap<String, AnswerValue>>,
    #[serde(default)]
    pub wizard_inputs: Option<WizardInputs>,
    #[serde(default, alias = "base_artifact_reference")]
    pub base_project_path: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    /// Explicit override; only `chat` is recognised
    #[serde(default)]
    pub action: Option<String>,
}

/// Inputs of a fresh build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateParams {
    pub user_input: Option<String>,
    pub page_type_key: Option<String>,
    pub questionnaire_answers: BTreeMap<String, AnswerValue>,
    pub wizard_inputs: Option<WizardInputs>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ClassifyIntent {
        user_input: String,
    },
    GenerateArtifact(GenerateParams),
    ModifyArtifact {
        instruction: String,
        base_reference: Option<String>,
    },
    Chat {
        user_input: String,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::ClassifyIntent { .. } => "classify",
            Action::GenerateArtifact(_) => "generate",
            Action::ModifyArtifact { .. } => "modify",
            Action::Chat { .. } => "chat",
        }
    }
}

/// A request after routing.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedRequest {
    pub session_id: String,
    pub model_family: Option<ModelFamily>,
    pub project_id: Option<String>,
    pub action: Action,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl StreamRequest {
    /// Pick the action from the populated fields.
    ///
    /// An instruction means modify; a page type, answers or wizard inputs mean
    /// generate; free text alone means classify first.
    pub fn route(self) -> Result<RoutedRequest, ApiError> {
        let session_id = present(self.session_id).unwrap_or_else(new_session_id);
        let user_input = present(self.user_input);
        let page_type_key = present(self.page_type_key);
        let instruction = present(self.instruction);
        let answers = self.questionnaire_answers.filter(|a| !a.is_empty());

        let action = match present(self.action).as_deref() {
            Some("chat") => Action::Chat {
                user_input: user_input.ok_or_else(|| {
                    ApiError::InvalidRequest("chat requires user_input".to_string())
                })?,
            },
            Some(other) => {
                return Err(ApiError::InvalidRequest(format!("Unknown action: {}", other)));
            }
            None => {
                if let Some(instruction) = instruction {
                    Action::ModifyArtifact {
                        instruction,
                        base_reference: present(self.base_project_path),
                    }
                } else if page_type_key.is_some() || answers.is_some() || self.wizard_inputs.is_some() {
                    Action::GenerateArtifact(GenerateParams {
                        user_input,
                        page_type_key,
                        questionnaire_answers: answers.unwrap_or_default(),
                        wizard_inputs: self.wizard_inputs,
                    })
                } else if let Some(user_input) = user_input {
                    Action::ClassifyIntent { user_input }
                } else {
                    return Err(ApiError::InvalidRequest(
                        "Request needs user_input, page_type_key, questionnaire_answers, wizard_inputs or instruction"
                            .to_string(),
                    ));
                }
            }
        };

        Ok(RoutedRequest {
            session_id,
            model_family: self.model_family,
            project_id: present(self.project_id),
            action,
        })
    }
}

/// One form field in an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormAnswer {
    #[serde(default)]
    pub label: String,
    pub answer: FieldValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseContent {
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, rename = "selectedOption", skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<String>,
    #[serde(default, rename = "selectedOptions", skip_serializing_if = "Option::is_none")]
    pub selected_options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<FormAnswer>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResponse {
    #[serde(default)]
    pub q_id: String,
    #[serde(default)]
    pub q_type: String,
    #[serde(default)]
    pub content: ResponseContent,
    #[serde(default)]
    pub skipped: bool,
}

/// Resume call answering previously emitted questions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub responses: Vec<QuestionResponse>,
    #[serde(default)]
    pub user_input: Option<String>,
}

/// Answers folded into session state plus the combined user prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAnswers {
    pub answers: BTreeMap<String, AnswerValue>,
    pub prompt: String,
    /// Keys picked in answer to the pending category question
    pub selected_categories: Vec<String>,
}

impl MessageRequest {
    /// Structural checks, run before any stream starts.
    pub fn validate(&self) -> Result<(), ApiError> {
        let invalid = |msg: String| Err(ApiError::InvalidRequest(msg));
        if self.project_id.trim().is_empty() {
            return invalid("project_id is required".to_string());
        }
        if self.chat_id.trim().is_empty() {
            return invalid("chat_id is required".to_string());
        }
        if self.responses.is_empty() {
            return invalid("responses must not be empty".to_string());
        }

        let mut open_ended = 0usize;
        for (idx, response) in self.responses.iter().enumerate() {
            if response.q_id.trim().is_empty() {
                return invalid(format!("responses[{}]: q_id is required", idx));
            }
            let Some(kind) = QuestionKind::parse(&response.q_type) else {
                return invalid(format!(
                    "responses[{}]: invalid q_type '{}', expected open_ended, mcq, multi_select or form",
                    idx, response.q_type
                ));
            };
            let c = &response.content;
            let populated = [
                ("answer", c.answer.is_some()),
                ("selectedOption", c.selected_option.is_some()),
                ("selectedOptions", c.selected_options.is_some()),
                ("answers", c.answers.is_some()),
            ];
            let allowed = match kind {
                QuestionKind::OpenEnded => "answer",
                QuestionKind::Mcq => "selectedOption",
                QuestionKind::MultiSelect => "selectedOptions",
                QuestionKind::Form => "answers",
            };
            if let Some((field, _)) = populated.iter().find(|(field, set)| *set && *field != allowed) {
                return invalid(format!(
                    "responses[{}]: {} accepts only '{}', found '{}'",
                    idx,
                    kind.as_str(),
                    allowed,
                    field
                ));
            }
            if kind == QuestionKind::OpenEnded {
                open_ended += 1;
            }
        }

        if open_ended > 1 {
            return invalid("Only one open_ended response is allowed".to_string());
        }
        if open_ended == 1 && self.responses.len() > 1 {
            return invalid("An open_ended response cannot be combined with other responses".to_string());
        }
        Ok(())
    }

    /// Fold responses into stored answers and prompt lines.
    ///
    /// `options` maps question ids to the options they were asked with, so picked
    /// ids render as labels. `category_question` is the pending category question.
    pub fn resolve(
        &self,
        options: &HashMap<String, Vec<QuestionOption>>,
        category_question: Option<&str>,
    ) -> ResolvedAnswers {
        let mut resolved = ResolvedAnswers::default();
        let mut lines: Vec<String> = Vec::new();

        let label_for = |q_id: &str, picked: &str| -> String {
            options
                .get(q_id)
                .and_then(|opts| opts.iter().find(|o| o.id == picked))
                .map(|o| o.label.clone())
                .unwrap_or_else(|| picked.to_string())
        };

        for response in self.responses.iter().filter(|r| !r.skipped) {
            let Some(kind) = QuestionKind::parse(&response.q_type) else {
                continue;
            };
            let c = &response.content;
            let (value, rendered) = match kind {
                QuestionKind::OpenEnded => {
                    let text = c.answer.clone().unwrap_or_default();
                    (AnswerValue::Text(text.clone()), text)
                }
                QuestionKind::Mcq => {
                    let picked = c.selected_option.clone().unwrap_or_default();
                    let rendered = if picked.is_empty() {
                        String::new()
                    } else {
                        label_for(&response.q_id, &picked)
                    };
                    (AnswerValue::Text(picked), rendered)
                }
                QuestionKind::MultiSelect => {
                    let picked = c.selected_options.clone().unwrap_or_default();
                    let rendered = picked
                        .iter()
                        .map(|id| label_for(&response.q_id, id))
                        .collect::<Vec<_>>()
                        .join(", ");
                    if category_question == Some(response.q_id.as_str()) {
                        resolved.selected_categories.extend(picked.iter().cloned());
                    }
                    (AnswerValue::List(picked), rendered)
                }
                QuestionKind::Form => {
                    let fields = c.answers.clone().unwrap_or_default();
                    let rendered = fields
                        .iter()
                        .map(|f| format!("{}: {}", f.label, f.answer.render()))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let map = fields
                        .into_iter()
                        .map(|f| (f.label, f.answer))
                        .collect::<BTreeMap<_, _>>();
                    (AnswerValue::Fields(map), rendered)
                }
            };

            if !rendered.trim().is_empty() {
                lines.push(format!("{}: {}", c.label, rendered));
            }
            resolved.answers.insert(response.q_id.clone(), value);
        }

        let combined = lines.join("\n");
        resolved.prompt = match present(self.user_input.clone()) {
            Some(extra) if !combined.is_empty() => {
                format!("{}\n\nAdditional requirements: {}", combined, extra)
            }
            Some(extra) => extra,
            None => combined,
        };
        resolved
    }
}
