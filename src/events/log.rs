//! Append-only JSON-lines mirror of emitted events.

use super::event::EventEnvelope;
use crate::error::StorageError;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl EventLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one line. Failures are logged and swallowed.
    pub fn append(&self, event: &EventEnvelope) {
        let mut line = event.to_json();
        line.push('\n');
        let mut file = self.file.lock();
        if let Err(err) = file.write_all(line.as_bytes()) {
            warn!(path = %self.path.display(), error = %err, "Failed to append event log");
        }
    }

    /// Read every parseable line back.
    pub fn read_all(path: &Path) -> Result<Vec<EventEnvelope>, StorageError> {
        let text = fs::read_to_string(path)?;
        Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| EventEnvelope::parse_frame(line).ok())
            .collect())
    }

    /// Logged events of one session and/or one event family, oldest first.
    ///
    /// `event_type` matches a full name (`chat.question`) or a family prefix
    /// (`progress`). `limit` keeps only the newest matches.
    pub fn query(
        path: &Path,
        event_type: Option<&str>,
        conversation_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<EventEnvelope>, StorageError> {
        let mut events: Vec<EventEnvelope> = Self::read_all(path)?
            .into_iter()
            .filter(|event| event_type.map_or(true, |wanted| type_matches(event, wanted)))
            .filter(|event| {
                conversation_id.map_or(true, |id| event.conversation_id.as_deref() == Some(id))
            })
            .collect();
        if let Some(limit) = limit {
            let skip = events.len().saturating_sub(limit);
            events.drain(..skip);
        }
        Ok(events)
    }
}

fn type_matches(event: &EventEnvelope, wanted: &str) -> bool {
    let name = event.event_type.as_str();
    name == wanted
        || name
            .strip_prefix(wanted)
            .map_or(false, |rest| rest.starts_with('.'))
}
