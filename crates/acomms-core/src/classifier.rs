//! Raw log → queue files.
//!
//! The classifier reads complete raw log lines from its cursor, routes each
//! through the [`RuleSet`], appends the record to the [`QueueStore`] and
//! persists the cursor past the line. Rejected lines are logged and skipped;
//! the cursor advances past them too, so one bad line never blocks the rest.
//!
//! The cursor also records the length of every queue file. On open, queue
//! bytes past those lengths are rolled back, so running from any persisted
//! cursor (or from zero again) converges on the same queue files as a single
//! pass over the whole log.

use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;

use crate::cursor::{ClassifierCursor, CursorFile};
use crate::domain::{AcommsError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::queue_store::QueueStore;
use crate::rules::RuleSet;
use crate::tail::{read_complete_lines, TailLine, TailRead};

/// Counts from one or more classification passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Complete lines consumed (including blank and rejected ones).
    pub lines: u64,
    pub routed: u64,
    pub rejected: u64,
}

impl AddAssign for PassSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.lines += rhs.lines;
        self.routed += rhs.routed;
        self.rejected += rhs.rejected;
    }
}

/// Single-threaded raw log consumer.
pub struct Classifier {
    raw_log: PathBuf,
    rules: RuleSet,
    store: QueueStore,
    cursor_file: CursorFile,
    cursor: ClassifierCursor,
}

impl Classifier {
    /// Resume from the cursor persisted in `cursor_file`.
    pub fn open(
        raw_log: impl Into<PathBuf>,
        store: QueueStore,
        cursor_file: CursorFile,
        rules: RuleSet,
    ) -> Result<Self> {
        let cursor = cursor_file.load()?;
        Self::with_cursor(raw_log, store, cursor_file, rules, cursor)
    }

    /// Start from an explicit cursor, e.g. `ClassifierCursor::default()` for a full replay.
    ///
    /// Queue files are rolled back to the lengths `cursor` committed.
    pub fn with_cursor(
        raw_log: impl Into<PathBuf>,
        mut store: QueueStore,
        cursor_file: CursorFile,
        rules: RuleSet,
        cursor: ClassifierCursor,
    ) -> Result<Self> {
        store.rollback(&cursor.queues)?;
        Ok(Self {
            raw_log: raw_log.into(),
            rules,
            store,
            cursor_file,
            cursor,
        })
    }

    pub fn cursor(&self) -> &ClassifierCursor {
        &self.cursor
    }

    pub fn raw_log(&self) -> &Path {
        &self.raw_log
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    /// Classify every complete line past the cursor.
    pub fn classify_pending(&mut self) -> Result<PassSummary> {
        self.classify_pending_until(None)
    }

    /// Like [`classify_pending`](Self::classify_pending), stopping between
    /// lines once `stop` reads `true`.
    pub fn classify_pending_until(
        &mut self,
        stop: Option<&watch::Receiver<bool>>,
    ) -> Result<PassSummary> {
        let lines = match read_complete_lines(&self.raw_log, self.cursor.offset, self.cursor.line)? {
            TailRead::Missing => return Ok(PassSummary::default()),
            TailRead::Truncated { len } => {
                return Err(AcommsError::CursorAhead {
                    path: self.raw_log.clone(),
                    offset: self.cursor.offset,
                    len,
                })
            }
            TailRead::Lines(lines) => lines,
        };

        let mut summary = PassSummary::default();
        for line in &lines {
            if stop.map(|rx| *rx.borrow()).unwrap_or(false) {
                tracing::debug!(line = line.index, "stop requested, leaving remaining lines");
                break;
            }
            self.process_line(line, &mut summary)?;
        }
        Ok(summary)
    }

    fn process_line(&mut self, line: &TailLine, summary: &mut PassSummary) -> Result<()> {
        let blank = line.bytes.iter().all(u8::is_ascii_whitespace);
        if !blank {
            match self.rules.classify_bytes(&line.bytes, line.index) {
                Ok(record) => {
                    let len = self.store.append(&record)?;
                    self.cursor.queues.insert(record.queue, len);
                    summary.routed += 1;
                    METRICS.inc_classified();
                    obs::emit_record_routed(line.index, record.queue);
                }
                Err(err) => {
                    summary.rejected += 1;
                    METRICS.inc_rejected();
                    obs::emit_line_rejected(line.index, &err);
                }
            }
        }

        summary.lines += 1;
        self.cursor.advance_past(line);
        self.cursor_file.store(&self.cursor)
    }

    /// Poll the raw log until `shutdown` flips to `true` (or its sender goes away).
    ///
    /// The line in progress is always finished and its cursor persisted
    /// before the loop exits.
    pub async fn run(
        &mut self,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<PassSummary> {
        let mut total = PassSummary::default();
        loop {
            if *shutdown.borrow() {
                break;
            }
            let pass = self.classify_pending_until(Some(&shutdown))?;
            if pass.lines > 0 {
                tracing::info!(
                    lines = pass.lines,
                    routed = pass.routed,
                    rejected = pass.rejected,
                    offset = self.cursor.offset,
                    "classification pass complete"
                );
            }
            total += pass;

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        Ok(total)
    }
}
