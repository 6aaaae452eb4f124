//! Structured observability hooks for the three acomms roles.
//!
//! This module provides:
//! - A session-scoped tracing span for live window sessions via `SessionSpan`
//! - Emission functions for the events each role reports: datagram logged,
//!   record routed, line rejected, record dropped on decode, session lifecycle
//!
//! Rejections and decode drops are `warn!`; everything else is `info!` or
//! `debug!`. For JSON output run the binaries with `--json`.

use tracing::{debug, info, warn};

use crate::domain::{ClassifyError, QueueType};

/// RAII guard that enters a session-scoped span for a live window session.
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    pub fn enter(session_id: &str) -> Self {
        let span = tracing::info_span!("acomms.window", session_id = %session_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a datagram was appended to the raw log.
pub fn emit_datagram_logged(source: &str, bytes: usize, entries: usize) {
    info!(
        event = "datagram.logged",
        source = %source,
        bytes = bytes,
        entries = entries,
    );
}

/// Emit event: a raw line was classified and written to its queue.
pub fn emit_record_routed(line: u64, queue: QueueType) {
    debug!(event = "record.routed", line = line, queue = %queue);
}

/// Emit event: a raw line could not be classified (warning level).
pub fn emit_line_rejected(line: u64, error: &ClassifyError) {
    warn!(event = "line.rejected", line = line, error = %error, "classification warning");
}

/// Emit event: a queue-file line failed to decode (warning level).
pub fn emit_record_dropped(queue: QueueType, line: u64, error: &dyn std::fmt::Display) {
    warn!(
        event = "record.dropped",
        queue = %queue,
        line = line,
        error = %error,
        "queue record failed to decode"
    );
}

/// Emit event: a live window session opened.
pub fn emit_session_opened(queues: &[QueueType], capacity: usize) {
    let names: Vec<&str> = queues.iter().map(QueueType::as_str).collect();
    info!(
        event = "session.opened",
        queues = %names.join(","),
        capacity = capacity,
    );
}

/// Emit event: a live window session closed.
pub fn emit_session_closed(records_buffered: usize) {
    info!(event = "session.closed", records_buffered = records_buffered);
}
