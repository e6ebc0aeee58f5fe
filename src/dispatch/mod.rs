mod classify;
mod engine;
mod log;

pub use classify::{
    ActionForError, CLIENT_ERROR_KEYWORDS, MappingAction, UPSTREAM_BODY_PREVIEW_CHARS,
    body_matches_client_error_keyword, classify_upstream_error,
};
pub use engine::{AttemptError, DispatchEngine, DispatchOutcome};
pub use log::{LogSink, RequestLog, StdoutLogSink};
