//! Server-sent-event decoding shared by the streaming backends.
//!
//! A raw byte stream is split into events on blank lines. The `data:` lines of each
//! event are joined and handed to a backend-specific decoder that yields an optional
//! text fragment. The `[DONE]` sentinel ends the stream.

use super::CompletionStream;
use crate::error::ApiError;
use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use tracing::debug;

/// Decoder for one event's joined `data:` payload.
pub trait EventDecoder: Fn(&str) -> Result<Option<String>, ApiError> + Send + 'static {}

impl<F> EventDecoder for F where F: Fn(&str) -> Result<Option<String>, ApiError> + Send + 'static {}

struct SseState<S, F> {
    body: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, ApiError>>,
    finished: bool,
    decode: F,
}

impl<S, F: EventDecoder> SseState<S, F> {
    fn push_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
        while let Some(end) = find_event_boundary(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..end + 2).collect();
            self.handle_event(&event[..end]);
            if self.finished {
                self.buffer.clear();
                break;
            }
        }
    }

    fn flush_tail(&mut self) {
        if self.buffer.iter().any(|b| !b.is_ascii_whitespace()) {
            let tail = std::mem::take(&mut self.buffer);
            self.handle_event(&tail);
        }
        self.finished = true;
    }

    fn handle_event(&mut self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let data = event_data(&text);
        let Some(data) = data else {
            return;
        };
        if data.trim() == "[DONE]" {
            debug!("SSE stream signalled completion");
            self.finished = true;
            return;
        }
        match (self.decode)(&data) {
            Ok(Some(fragment)) if !fragment.is_empty() => self.pending.push_back(Ok(fragment)),
            Ok(_) => {}
            Err(err) => {
                self.pending.push_back(Err(err));
                self.finished = true;
            }
        }
    }
}

fn find_event_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Joined `data:` payload of one event, or `None` when the event carries no data.
fn event_data(event: &str) -> Option<String> {
    let lines: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Turn a chunked response body into a finite stream of decoded text fragments.
pub fn sse_fragments<S, B, E, F>(body: S, decode: F) -> CompletionStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
    F: EventDecoder,
{
    let state = SseState {
        body: Box::pin(body),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
        decode,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => state.push_bytes(chunk.as_ref()),
                Some(Err(err)) => {
                    state.finished = true;
                    state.pending.push_back(Err(ApiError::ProviderRequestFailed(format!(
                        "Stream interrupted: {}",
                        err
                    ))));
                }
                None => state.flush_tail(),
            }
        }
    }))
}
