//! Acomms Core Library
//!
//! Acoustic telemetry ingest: the raw log written by the UDP listener, the
//! classifier that routes raw lines into typed queue files, and the live
//! window that tails those files for display.

pub mod classifier;
pub mod config;
pub mod cursor;
pub mod domain;
pub mod listener;
pub mod metrics;
pub mod obs;
pub mod queue_store;
pub mod raw_log;
pub mod rules;
pub mod spoof;
pub mod tail;
pub mod telemetry;
pub mod window;

pub use domain::{
    format_receipt_time, parse_timestamp, split_datagram, AcommsError, ClassifyError, FieldValue,
    ParsedRecord, QueueType, RawLine, RawMessage, Result,
};

pub use classifier::{Classifier, PassSummary};
pub use config::{ClassifierConfig, WindowConfig};
pub use cursor::{ClassifierCursor, CursorFile};
pub use listener::Listener;
pub use queue_store::{digest_queue_files, queue_path, QueueStore};
pub use raw_log::RawLogWriter;
pub use rules::{Rule, RuleSet};
pub use spoof::{Lcg, MessageKind, Spoofer};
pub use tail::{LineTail, TailLine, TailPoll, TailRead};
pub use window::{
    align_asof, field_extent, merge, repeated_timestamp, AlignedFix, BufferedRecord, Extent,
    LiveWindow, TimeRange, WindowStatus, Zoom,
};

pub use metrics::METRICS;
pub use obs::SessionSpan;
pub use telemetry::init_tracing;

/// Acomms version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
