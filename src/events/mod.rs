//! Event protocol: the envelope, the closed event vocabulary, and the emitter that
//! enforces ordering, blocking and single-terminal rules for one stream.

pub mod emitter;
pub mod event;
pub mod log;
pub mod progress;

pub use emitter::{EventEmitter, EventStream};
pub use event::{
    new_event_id, new_question_id, ErrorAction, ErrorScope, EventEnvelope, EventType, FormField,
    FsKind, ProgressMode, Question, QuestionContent, QuestionKind, QuestionOption, SessionScope,
    StepStatus,
};
pub use log::EventLog;
pub use progress::{ProgressStep, ProgressTracker};
