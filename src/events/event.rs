//! Event envelope and payload schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Closed event vocabulary. The type alone determines the payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "chat.message")]
    ChatMessage,
    #[serde(rename = "thinking.start")]
    ThinkingStart,
    #[serde(rename = "thinking.end")]
    ThinkingEnd,
    #[serde(rename = "chat.question")]
    ChatQuestion,
    #[serde(rename = "chat.suggestion")]
    ChatSuggestion,
    #[serde(rename = "progress.init")]
    ProgressInit,
    #[serde(rename = "progress.update")]
    ProgressUpdate,
    #[serde(rename = "progress.transition")]
    ProgressTransition,
    #[serde(rename = "fs.create")]
    FsCreate,
    #[serde(rename = "fs.write")]
    FsWrite,
    #[serde(rename = "fs.delete")]
    FsDelete,
    #[serde(rename = "edit.start")]
    EditStart,
    #[serde(rename = "edit.end")]
    EditEnd,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "stream.complete")]
    StreamComplete,
    #[serde(rename = "stream.await_input")]
    StreamAwaitInput,
    #[serde(rename = "stream.failed")]
    StreamFailed,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::ChatMessage => "chat.message",
            EventType::ThinkingStart => "thinking.start",
            EventType::ThinkingEnd => "thinking.end",
            EventType::ChatQuestion => "chat.question",
            EventType::ChatSuggestion => "chat.suggestion",
            EventType::ProgressInit => "progress.init",
            EventType::ProgressUpdate => "progress.update",
            EventType::ProgressTransition => "progress.transition",
            EventType::FsCreate => "fs.create",
            EventType::FsWrite => "fs.write",
            EventType::FsDelete => "fs.delete",
            EventType::EditStart => "edit.start",
            EventType::EditEnd => "edit.end",
            EventType::Error => "error",
            EventType::StreamComplete => "stream.complete",
            EventType::StreamAwaitInput => "stream.await_input",
            EventType::StreamFailed => "stream.failed",
        }
    }

    /// Exactly one terminal event ends every stream.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventType::StreamComplete | EventType::StreamAwaitInput | EventType::StreamFailed
        )
    }

    /// Blocking events halt the stream until the client answers.
    pub fn is_blocking(self) -> bool {
        matches!(self, EventType::ChatQuestion | EventType::ChatSuggestion)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlation ids copied onto every envelope of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl SessionScope {
    pub fn new(project_id: Option<String>, conversation_id: Option<String>) -> Self {
        Self {
            project_id,
            conversation_id,
        }
    }
}

/// One emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub event_type: EventType,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl EventEnvelope {
    pub fn new(event_type: EventType, scope: &SessionScope, payload: Value) -> Self {
        Self {
            event_id: new_event_id(),
            event_type,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            project_id: scope.project_id.clone(),
            conversation_id: scope.conversation_id.clone(),
            payload,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// `data: <json>\n\n`
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }

    /// Parse one SSE frame or a bare JSON line.
    pub fn parse_frame(frame: &str) -> Result<Self, serde_json::Error> {
        let trimmed = frame.trim();
        let json = trimmed.strip_prefix("data:").map(str::trim).unwrap_or(trimmed);
        serde_json::from_str(json)
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// `evt_` followed by 8 hex characters.
pub fn new_event_id() -> String {
    let id = uuid::Uuid::new_v4();
    format!("evt_{}", hex::encode(&id.as_bytes()[..4]))
}

/// `q_` followed by 8 hex characters.
pub fn new_question_id() -> String {
    let id = uuid::Uuid::new_v4();
    format!("q_{}", hex::encode(&id.as_bytes()[..4]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMode {
    Modal,
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsKind {
    File,
    Folder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorScope {
    Runtime,
    Model,
    Validation,
    Build,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    Retry,
    AskUser,
    AutoFix,
}

/// Question type on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    OpenEnded,
    Mcq,
    MultiSelect,
    Form,
}

impl QuestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::OpenEnded => "open_ended",
            QuestionKind::Mcq => "mcq",
            QuestionKind::MultiSelect => "multi_select",
            QuestionKind::Form => "form",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open_ended" => Some(QuestionKind::OpenEnded),
            "mcq" => Some(QuestionKind::Mcq),
            "multi_select" => Some(QuestionKind::MultiSelect),
            "form" => Some(QuestionKind::Form),
            _ => None,
        }
    }

    /// Kinds answered by picking from `content.options`.
    pub fn has_options(self) -> bool {
        matches!(self, QuestionKind::Mcq | QuestionKind::MultiSelect)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionContent {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<QuestionOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FormField>,
}

/// Payload of `chat.question` / `chat.suggestion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub q_id: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub label: String,
    #[serde(rename = "isSkippable")]
    pub is_skippable: bool,
    #[serde(default)]
    pub content: QuestionContent,
}

impl Question {
    pub fn new(kind: QuestionKind, label: impl Into<String>) -> Self {
        Self {
            q_id: new_question_id(),
            kind,
            label: label.into(),
            is_skippable: false,
            content: QuestionContent::default(),
        }
    }

    pub fn skippable(mut self, skippable: bool) -> Self {
        self.is_skippable = skippable;
        self
    }

    pub fn with_options(mut self, options: Vec<QuestionOption>) -> Self {
        self.content.options = options;
        self
    }

    pub fn with_fields(mut self, fields: Vec<FormField>) -> Self {
        self.content.fields = fields;
        self
    }
}
