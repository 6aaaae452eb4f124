//! Domain models for acomms.
//!
//! Canonical definitions for the core entities:
//! - `RawMessage`: a received datagram as it lands in the raw log
//! - `QueueType`: the category a message is routed to
//! - `ParsedRecord`: a classified, typed message as stored in a queue file

pub mod error;
pub mod queue;
pub mod raw;
pub mod record;

// Re-export main types and errors
pub use error::{AcommsError, ClassifyError, Result};
pub use queue::QueueType;
pub use raw::{
    format_receipt_time, parse_timestamp, split_datagram, RawLine, RawMessage, TORN_LINE_MARKER,
};
pub use record::{parse_finite, FieldValue, ParsedRecord};
