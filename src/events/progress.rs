//! Step tracking for `progress.*` events.

use super::event::StepStatus;
use crate::error::ApiError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressStep {
    pub id: String,
    pub label: String,
    pub status: StepStatus,
}

impl ProgressStep {
    pub fn pending(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            status: StepStatus::Pending,
        }
    }
}

/// Current status of every declared step.
///
/// Steps only move forward: pending → in_progress → completed | failed. A final
/// step cannot be revisited.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    steps: Vec<ProgressStep>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self, steps: Vec<ProgressStep>) {
        self.steps = steps;
    }

    pub fn steps(&self) -> &[ProgressStep] {
        &self.steps
    }

    pub fn status(&self, step_id: &str) -> Option<StepStatus> {
        self.steps.iter().find(|s| s.id == step_id).map(|s| s.status)
    }

    /// Validate a transition without recording it.
    pub fn check(&self, step_id: &str, status: StepStatus) -> Result<(), ApiError> {
        let step = self
            .steps
            .iter()
            .find(|s| s.id == step_id)
            .ok_or_else(|| ApiError::Protocol(format!("unknown progress step: {}", step_id)))?;

        if step.status.is_final() || rank(status) < rank(step.status) {
            return Err(ApiError::Protocol(format!(
                "progress step {} cannot move from {} to {}",
                step_id,
                step.status.as_str(),
                status.as_str()
            )));
        }
        Ok(())
    }

    /// Validate and record a transition.
    pub fn advance(&mut self, step_id: &str, status: StepStatus) -> Result<(), ApiError> {
        self.check(step_id, status)?;
        if let Some(step) = self.steps.iter_mut().find(|s| s.id == step_id) {
            step.status = status;
        }
        Ok(())
    }
}

fn rank(status: StepStatus) -> u8 {
    match status {
        StepStatus::Pending => 0,
        StepStatus::InProgress => 1,
        StepStatus::Completed | StepStatus::Failed => 2,
    }
}
