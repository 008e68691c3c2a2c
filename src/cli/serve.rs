//! JSON-lines serve loop over stdin/stdout.
//!
//! Each input line is one operation tagged by `op`. Streaming operations write
//! their event frames; the rest write a single `{"ok": ...}` line. Sessions
//! live as long as the process.

use crate::api::{GenerateRequest, IntentRequest, KilnApi, ModifyRequest};
use crate::cli::output::map_error;
use crate::cli::parse::FrameFormat;
use crate::cli::presentation::write_frame;
use crate::error::{ApiError, StorageError};
use crate::events::{EventStream, EventType};
use crate::request::{MessageRequest, StreamRequest};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServeOp {
    Stream(StreamRequest),
    Message(MessageRequest),
    Classify(IntentRequest),
    Generate(GenerateRequest),
    Modify(ModifyRequest),
    Latest,
    Health,
}

impl ServeOp {
    fn name(&self) -> &'static str {
        match self {
            ServeOp::Stream(_) => "stream",
            ServeOp::Message(_) => "message",
            ServeOp::Classify(_) => "classify",
            ServeOp::Generate(_) => "generate",
            ServeOp::Modify(_) => "modify",
            ServeOp::Latest => "latest",
            ServeOp::Health => "health",
        }
    }
}

fn io_error(e: std::io::Error) -> ApiError {
    ApiError::StorageError(StorageError::IoError(e))
}

/// Write every frame of `stream` to stdout, flushing per frame. Returns the
/// terminal event type, if one arrived.
pub(crate) async fn pump_frames(
    mut stream: EventStream,
    format: FrameFormat,
) -> Result<Option<EventType>, ApiError> {
    let mut stdout = tokio::io::stdout();
    let mut terminal = None;
    while let Some(envelope) = stream.next().await {
        stdout
            .write_all(write_frame(&envelope, format).as_bytes())
            .await
            .map_err(io_error)?;
        stdout.flush().await.map_err(io_error)?;
        if envelope.event_type.is_terminal() {
            terminal = Some(envelope.event_type);
        }
    }
    Ok(terminal)
}

async fn write_line(value: &Value) -> Result<(), ApiError> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("{}\n", value).as_bytes())
        .await
        .map_err(io_error)?;
    stdout.flush().await.map_err(io_error)
}

fn reply<T: serde::Serialize>(result: Result<T, ApiError>) -> Value {
    match result {
        Ok(value) => json!({ "ok": true, "result": value }),
        Err(e) => json!({ "ok": false, "error": map_error(&e) }),
    }
}

/// Run one parsed operation.
pub async fn dispatch(api: &KilnApi, op: ServeOp, format: FrameFormat) -> Result<(), ApiError> {
    debug!(op = op.name(), "Serving operation");
    match op {
        ServeOp::Stream(request) => {
            pump_frames(api.orchestrator().stream(request), format).await?;
        }
        ServeOp::Message(request) => match api.orchestrator().resume(request) {
            Ok(stream) => {
                pump_frames(stream, format).await?;
            }
            Err(e) => write_line(&reply::<()>(Err(e))).await?,
        },
        ServeOp::Classify(request) => write_line(&reply(api.classify_intent(request).await)).await?,
        ServeOp::Generate(request) => write_line(&reply(api.generate_artifact(request).await)).await?,
        ServeOp::Modify(request) => write_line(&reply(api.modify_artifact(request).await)).await?,
        ServeOp::Latest => write_line(&reply(api.latest_artifact())).await?,
        ServeOp::Health => write_line(&reply(Ok(api.health()))).await?,
    }
    Ok(())
}

/// Serve until stdin closes. Returns the number of operations handled.
pub async fn serve(api: &KilnApi, format: FrameFormat) -> Result<usize, ApiError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut handled = 0usize;
    info!("Serving JSON-lines requests on stdin");
    while let Some(line) = lines.next_line().await.map_err(io_error)? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ServeOp>(line) {
            Ok(op) => dispatch(api, op, format).await?,
            Err(e) => {
                warn!(error = %e, "Unreadable serve operation");
                let err = ApiError::InvalidRequest(format!("Unreadable operation: {}", e));
                write_line(&reply::<()>(Err(err))).await?;
            }
        }
        handled += 1;
    }
    info!(handled, "Input closed");
    Ok(handled)
}
