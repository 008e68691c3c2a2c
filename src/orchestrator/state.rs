//! Stream phases and the transitions allowed between them.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    Classifying,
    Greeting,
    Refusing,
    Chatting,
    Clarifying,
    BuildingArtifact,
    AwaitingCategorySelection,
    AwaitingQuestionnaire,
    Modifying,
    Generating,
    Parsing,
    ParseFailed,
    Saving,
    Completed,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Classifying => "classifying",
            Phase::Greeting => "greeting",
            Phase::Refusing => "refusing",
            Phase::Chatting => "chatting",
            Phase::Clarifying => "clarifying",
            Phase::BuildingArtifact => "building_artifact",
            Phase::AwaitingCategorySelection => "awaiting_category_selection",
            Phase::AwaitingQuestionnaire => "awaiting_questionnaire",
            Phase::Modifying => "modifying",
            Phase::Generating => "generating",
            Phase::Parsing => "parsing",
            Phase::ParseFailed => "parse_failed",
            Phase::Saving => "saving",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        }
    }

    /// Phases that end a stream. Awaiting phases end the stream but not the conversation.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            Phase::Completed
                | Phase::Failed
                | Phase::AwaitingCategorySelection
                | Phase::AwaitingQuestionnaire
        )
    }

    /// Whether `next` may directly follow `self`.
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        if next == Failed {
            return !self.is_final() || self.is_awaiting();
        }
        match self {
            Start => matches!(next, Classifying | Chatting | Generating | Modifying),
            Classifying => matches!(
                next,
                Greeting | Refusing | Chatting | Clarifying | BuildingArtifact
            ),
            Greeting | Refusing | Chatting | Clarifying => next == Completed,
            BuildingArtifact => matches!(
                next,
                AwaitingCategorySelection | AwaitingQuestionnaire | Generating | Completed
            ),
            AwaitingCategorySelection | AwaitingQuestionnaire => next == Generating,
            Modifying => next == Generating,
            Generating => next == Parsing,
            // a modification may stream a second time with the default model
            Parsing => matches!(next, Saving | ParseFailed | Generating),
            ParseFailed => false,
            Saving => next == Completed,
            Completed | Failed => false,
        }
    }

    fn is_awaiting(self) -> bool {
        matches!(self, Phase::AwaitingCategorySelection | Phase::AwaitingQuestionnaire)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase history of one stream.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    current: Phase,
    history: Vec<Phase>,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::starting_at(Phase::Start)
    }
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A machine picking up a suspended conversation.
    pub fn starting_at(phase: Phase) -> Self {
        Self {
            current: phase,
            history: vec![phase],
        }
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn advance(&mut self, next: Phase) -> Result<(), ApiError> {
        if !self.current.can_advance_to(next) {
            return Err(ApiError::Protocol(format!(
                "illegal phase transition {} -> {}",
                self.current, next
            )));
        }
        debug!(from = %self.current, to = %next, "Phase transition");
        self.current = next;
        self.history.push(next);
        Ok(())
    }
}
