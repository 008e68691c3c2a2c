//! Per-conversation state.
//!
//! Sessions are keyed by a caller-chosen id and created on first use. The
//! [`SessionStore`] trait is the only way the orchestrator touches them, so the
//! in-memory store can be replaced without changing orchestration code.

use crate::events::QuestionOption;
use crate::provider::ModelFamily;
use crate::request::{AnswerValue, WizardInputs};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// One applied modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub instruction: String,
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHistory {
    pub initial_query: Option<String>,
    pub wizard_inputs: Option<WizardInputs>,
    pub modifications: Vec<Modification>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Free-form inputs collected across turns
    pub collected: Vec<String>,
    pub initial_intent: Option<String>,
    /// Active page type key
    pub category: Option<String>,
    pub model_family: Option<ModelFamily>,
    pub questionnaire_answers: BTreeMap<String, AnswerValue>,
    /// Options each emitted choice question was asked with, by question id
    pub question_options: HashMap<String, Vec<QuestionOption>>,
    pub pending_category_question: Option<String>,
    pub last_artifact: Option<PathBuf>,
    pub history: SessionHistory,
    pub project_id: Option<String>,
    pub chat_id: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Record options so picked ids can be mapped back to labels on resume.
    pub fn remember_options(&mut self, q_id: &str, options: Vec<QuestionOption>) {
        if !options.is_empty() {
            self.question_options.insert(q_id.to_string(), options);
        }
    }

    pub fn collect(&mut self, input: &str) {
        let input = input.trim();
        if !input.is_empty() {
            self.collected.push(input.to_string());
        }
    }
}

/// Key-value access to sessions. Reads return snapshots.
pub trait SessionStore: Send + Sync {
    /// Existing session, or a fresh one stored under `id`.
    fn get_or_create(&self, id: &str) -> Session;

    fn get(&self, id: &str) -> Option<Session>;

    fn put(&self, id: &str, session: Session);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-modify-write. Concurrent writers to one id are last-writer-wins.
    fn update(&self, id: &str, apply: &mut dyn FnMut(&mut Session)) -> Session {
        let mut session = self.get_or_create(id);
        apply(&mut session);
        self.put(id, session.clone());
        session
    }
}

/// Process-lifetime store. Sessions are never evicted.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get_or_create(&self, id: &str) -> Session {
        if let Some(session) = self.sessions.read().get(id) {
            return session.clone();
        }
        self.sessions
            .write()
            .entry(id.to_string())
            .or_insert_with(|| Session::new(id))
            .clone()
    }

    fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    fn put(&self, id: &str, session: Session) {
        self.sessions.write().insert(id.to_string(), session);
    }

    fn len(&self) -> usize {
        self.sessions.read().len()
    }
}
