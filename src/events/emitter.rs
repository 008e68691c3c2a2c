//! Per-stream event emitter.
//!
//! One emitter belongs to one stream. It stamps envelopes with the stream scope,
//! forwards them in order over an unbounded channel, optionally mirrors them to the
//! event log, and refuses emissions that would break the stream protocol.

use super::event::{
    ErrorAction, ErrorScope, EventEnvelope, EventType, FsKind, ProgressMode, Question,
    SessionScope, StepStatus,
};
use super::log::EventLog;
use super::progress::{ProgressStep, ProgressTracker};
use crate::error::ApiError;
use futures::Stream;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

/// Receiving side of a stream, in emission order.
pub type EventStream = Pin<Box<dyn Stream<Item = EventEnvelope> + Send>>;

pub struct EventEmitter {
    scope: SessionScope,
    tx: Option<mpsc::UnboundedSender<EventEnvelope>>,
    log: Option<Arc<EventLog>>,
    progress: ProgressTracker,
    blocked: bool,
    terminal: Option<EventType>,
    thinking_since: Option<Instant>,
    edit_since: HashMap<String, Instant>,
    emitted: usize,
    receiver_gone: bool,
}

impl EventEmitter {
    /// Emitter plus the stream the caller consumes.
    pub fn channel(scope: SessionScope, log: Option<Arc<EventLog>>) -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        (Self::build(scope, Some(tx), log), Box::pin(stream))
    }

    /// Emitter with no live receiver; events only reach the log.
    pub fn detached(scope: SessionScope, log: Option<Arc<EventLog>>) -> Self {
        Self::build(scope, None, log)
    }

    fn build(
        scope: SessionScope,
        tx: Option<mpsc::UnboundedSender<EventEnvelope>>,
        log: Option<Arc<EventLog>>,
    ) -> Self {
        Self {
            scope,
            tx,
            log,
            progress: ProgressTracker::new(),
            blocked: false,
            terminal: None,
            thinking_since: None,
            edit_since: HashMap::new(),
            emitted: 0,
            receiver_gone: false,
        }
    }

    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }

    pub fn terminal(&self) -> Option<EventType> {
        self.terminal
    }

    pub fn is_terminated(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    fn emit<P: Serialize>(&mut self, event_type: EventType, payload: &P) -> Result<(), ApiError> {
        if let Some(terminal) = self.terminal {
            return Err(ApiError::Protocol(format!(
                "{} emitted after terminal {}",
                event_type, terminal
            )));
        }
        if self.blocked && !(event_type.is_blocking() || event_type == EventType::StreamAwaitInput) {
            return Err(ApiError::Protocol(format!(
                "{} emitted while waiting for an answer",
                event_type
            )));
        }

        let payload = serde_json::to_value(payload)
            .map_err(|e| ApiError::Protocol(format!("unserializable {} payload: {}", event_type, e)))?;
        let envelope = EventEnvelope::new(event_type, &self.scope, payload);

        if let Some(log) = &self.log {
            log.append(&envelope);
        }
        if let Some(tx) = &self.tx {
            if tx.send(envelope).is_err() && !self.receiver_gone {
                self.receiver_gone = true;
                debug!(event_type = %event_type, "Receiver dropped, discarding remaining events");
            }
        }

        self.emitted += 1;
        if event_type.is_blocking() {
            self.blocked = true;
        }
        if event_type.is_terminal() {
            self.terminal = Some(event_type);
        }
        Ok(())
    }

    pub fn message(&mut self, content: impl Into<String>) -> Result<(), ApiError> {
        self.emit(EventType::ChatMessage, &json!({ "content": content.into() }))
    }

    pub fn thinking_start(&mut self) -> Result<(), ApiError> {
        self.thinking_since = Some(Instant::now());
        self.emit(EventType::ThinkingStart, &json!({}))
    }

    pub fn thinking_end(&mut self) -> Result<(), ApiError> {
        let duration_ms = elapsed_ms(self.thinking_since.take());
        self.emit(EventType::ThinkingEnd, &json!({ "duration_ms": duration_ms }))
    }

    pub fn question(&mut self, question: &Question) -> Result<(), ApiError> {
        self.emit(EventType::ChatQuestion, question)
    }

    pub fn suggestion(&mut self, question: &Question) -> Result<(), ApiError> {
        self.emit(EventType::ChatSuggestion, question)
    }

    pub fn progress_init(&mut self, mode: ProgressMode, steps: Vec<ProgressStep>) -> Result<(), ApiError> {
        let payload = json!({ "mode": mode, "steps": steps });
        self.emit(EventType::ProgressInit, &payload)?;
        self.progress.init(steps);
        Ok(())
    }

    pub fn progress_update(&mut self, step_id: &str, status: StepStatus) -> Result<(), ApiError> {
        self.progress.check(step_id, status)?;
        self.emit(
            EventType::ProgressUpdate,
            &json!({ "step_id": step_id, "status": status }),
        )?;
        self.progress.advance(step_id, status)
    }

    pub fn progress_transition(&mut self, mode: ProgressMode) -> Result<(), ApiError> {
        self.emit(EventType::ProgressTransition, &json!({ "mode": mode }))
    }

    pub fn fs_create(&mut self, path: &str, kind: FsKind) -> Result<(), ApiError> {
        self.emit(EventType::FsCreate, &json!({ "path": path, "kind": kind }))
    }

    /// Authoritative file content.
    pub fn fs_write(
        &mut self,
        path: &str,
        language: Option<&str>,
        content: Option<&str>,
    ) -> Result<(), ApiError> {
        let mut payload = json!({ "path": path, "kind": FsKind::File });
        if let Some(language) = language {
            payload["language"] = Value::from(language);
        }
        if let Some(content) = content {
            payload["content"] = Value::from(content);
        }
        self.emit(EventType::FsWrite, &payload)
    }

    pub fn fs_delete(&mut self, path: &str) -> Result<(), ApiError> {
        self.emit(EventType::FsDelete, &json!({ "path": path }))
    }

    /// One incremental chunk on the edit timeline of `path`.
    pub fn edit_chunk(&mut self, path: &str, content: &str) -> Result<(), ApiError> {
        self.edit_since
            .entry(path.to_string())
            .or_insert_with(Instant::now);
        self.emit(EventType::EditStart, &json!({ "path": path, "content": content }))
    }

    pub fn edit_end(&mut self, path: &str) -> Result<(), ApiError> {
        let duration_ms = elapsed_ms(self.edit_since.remove(path));
        self.emit(EventType::EditEnd, &json!({ "path": path, "duration_ms": duration_ms }))
    }

    pub fn error(
        &mut self,
        scope: ErrorScope,
        message: impl Into<String>,
        details: Option<&str>,
        actions: &[ErrorAction],
    ) -> Result<(), ApiError> {
        let mut payload = json!({ "scope": scope, "message": message.into() });
        if let Some(details) = details {
            payload["details"] = Value::from(details);
        }
        if !actions.is_empty() {
            payload["actions"] = json!(actions);
        }
        self.emit(EventType::Error, &payload)
    }

    pub fn complete(&mut self) -> Result<(), ApiError> {
        self.emit(EventType::StreamComplete, &json!({}))
    }

    pub fn await_input(&mut self, reason: &str) -> Result<(), ApiError> {
        self.emit(EventType::StreamAwaitInput, &json!({ "reason": reason }))
    }

    pub fn failed(&mut self) -> Result<(), ApiError> {
        self.emit(EventType::StreamFailed, &json!({}))
    }

    /// `error{runtime}` then `stream.failed`, also while waiting for an answer.
    /// Does nothing once a terminal event went out.
    pub fn fail_runtime(&mut self, message: &str) -> Result<(), ApiError> {
        if self.terminal.is_some() {
            return Ok(());
        }
        self.blocked = false;
        self.error(ErrorScope::Runtime, message, None, &[])?;
        self.failed()
    }
}

fn elapsed_ms(since: Option<Instant>) -> u64 {
    since
        .map(|start| start.elapsed().as_millis() as u64)
        .unwrap_or(0)
}
