//! Domain-level error taxonomy for acomms.

use std::path::PathBuf;

/// Recoverable per-line classification failures.
///
/// None of these stop the classifier: the line is skipped, a warning is
/// logged and the cursor still advances past it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifyError {
    #[error("line has no field delimiter")]
    MissingDelimiter,

    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    #[error("unparseable timestamp: {0}")]
    BadTimestamp(String),

    #[error("unknown message header: {0}")]
    UnknownHeader(String),

    #[error("{queue} message expects {expected} fields, got {actual}")]
    FieldCount {
        queue: String,
        expected: usize,
        actual: usize,
    },

    #[error("field {field} is not numeric: {value}")]
    NotNumeric { field: String, value: String },

    #[error("malformed key=value pair: {0}")]
    MalformedPair(String),

    #[error("duplicate key in payload: {0}")]
    DuplicateKey(String),

    #[error("required field {0} is empty")]
    EmptyField(String),

    #[error("message carries no fields")]
    EmptyPayload,

    #[error("line was cut short by an interrupted write")]
    TornLine,
}

/// acomms domain errors.
#[derive(Debug, thiserror::Error)]
pub enum AcommsError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("cursor offset {offset} is beyond the end of {path} ({len} bytes)")]
    CursorAhead {
        path: PathBuf,
        offset: u64,
        len: u64,
    },

    #[error("{path} holds {len} bytes but the cursor committed {committed}")]
    QueueBehindCursor {
        path: PathBuf,
        committed: u64,
        len: u64,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("classification error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for acomms domain operations.
pub type Result<T> = std::result::Result<T, AcommsError>;
