//! Live window over queue files.
//!
//! A [`LiveWindow`] tails a set of queue files and keeps, per queue, a
//! bounded FIFO buffer of the most recently arrived records. Views are
//! computed on demand: zooming narrows what a view returns but never
//! touches the buffers, so clearing the zoom brings the full window back.
//!
//! Lifecycle: a window is `Streaming` from [`LiveWindow::open`] until
//! [`LiveWindow::close`]; once `Closed`, tailing and zooming do nothing.

pub mod align;
pub mod zoom;

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::time::Duration;

use tokio::sync::watch;
use uuid::Uuid;

use crate::config::WindowConfig;
use crate::domain::{ParsedRecord, QueueType, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::queue_store::queue_path;
use crate::tail::{LineTail, TailLine};

pub use align::{align_asof, field_extent, merge, repeated_timestamp, AlignedFix, Extent};
pub use zoom::{TimeRange, Zoom};

/// Operational state of a window session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    Streaming,
    Closed,
}

/// A record held in a window buffer, stamped with its arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedRecord {
    /// Window-wide arrival sequence number.
    pub seq: u64,
    pub record: ParsedRecord,
}

struct QueueBuffer {
    tail: LineTail,
    records: VecDeque<BufferedRecord>,
}

/// Bounded, zoomable, multi-queue live view.
pub struct LiveWindow {
    session_id: Uuid,
    capacity: usize,
    buffers: BTreeMap<QueueType, QueueBuffer>,
    zoom: Option<Zoom>,
    status: WindowStatus,
    next_seq: u64,
}

impl LiveWindow {
    /// Start a session over `queues` inside `queue_dir`.
    ///
    /// Queue files need not exist yet; they are picked up once created.
    pub fn open(queue_dir: &Path, queues: &[QueueType], config: &WindowConfig) -> Self {
        let buffers = queues
            .iter()
            .map(|q| {
                (
                    *q,
                    QueueBuffer {
                        tail: LineTail::new(queue_path(queue_dir, *q)),
                        records: VecDeque::new(),
                    },
                )
            })
            .collect();
        let capacity = config.capacity.max(1);
        obs::emit_session_opened(queues, capacity);
        Self {
            session_id: Uuid::new_v4(),
            capacity,
            buffers,
            zoom: None,
            status: WindowStatus::Streaming,
            next_seq: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn status(&self) -> WindowStatus {
        self.status
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queues this window follows.
    pub fn queues(&self) -> Vec<QueueType> {
        self.buffers.keys().copied().collect()
    }

    /// Poll every followed queue file once. Returns the number of records ingested.
    pub fn tail(&mut self) -> Result<usize> {
        let queues = self.queues();
        let mut ingested = 0;
        for queue in queues {
            ingested += self.tail_queue(queue)?;
        }
        Ok(ingested)
    }

    /// Poll one queue file for complete new lines.
    pub fn tail_queue(&mut self, queue: QueueType) -> Result<usize> {
        if self.status == WindowStatus::Closed {
            return Ok(0);
        }
        let Some(buffer) = self.buffers.get_mut(&queue) else {
            return Ok(0);
        };

        let poll = buffer.tail.poll()?;
        if poll.restarted {
            buffer.records.clear();
        }

        let decoded: Vec<ParsedRecord> = poll
            .lines
            .iter()
            .filter_map(|line| decode_line(queue, line))
            .collect();
        let ingested = decoded.len();
        for record in decoded {
            self.push(record);
        }
        METRICS.add_tailed(ingested as u64);
        Ok(ingested)
    }

    /// Add a record to its queue's buffer, evicting the oldest arrival when full.
    ///
    /// Records for queues the window does not follow are ignored.
    pub fn push(&mut self, record: ParsedRecord) {
        if self.status == WindowStatus::Closed {
            return;
        }
        let Some(buffer) = self.buffers.get_mut(&record.queue) else {
            return;
        };
        buffer.records.push_back(BufferedRecord {
            seq: self.next_seq,
            record,
        });
        self.next_seq += 1;
        while buffer.records.len() > self.capacity {
            buffer.records.pop_front();
        }
    }

    /// Set or clear (`None`) the view bounds.
    pub fn zoom(&mut self, bounds: Option<Zoom>) {
        if self.status == WindowStatus::Closed {
            return;
        }
        self.zoom = bounds;
    }

    pub fn zoom_bounds(&self) -> Option<&Zoom> {
        self.zoom.as_ref()
    }

    /// Buffered records of `queue` in arrival order, ignoring zoom.
    pub fn buffer(&self, queue: QueueType) -> impl Iterator<Item = &ParsedRecord> {
        self.buffers
            .get(&queue)
            .into_iter()
            .flat_map(|b| b.records.iter().map(|r| &r.record))
    }

    pub fn len(&self, queue: QueueType) -> usize {
        self.buffers.get(&queue).map_or(0, |b| b.records.len())
    }

    /// Total records buffered across all queues.
    pub fn total_len(&self) -> usize {
        self.buffers.values().map(|b| b.records.len()).sum()
    }

    /// Zoomed view of one queue, oldest first.
    pub fn view(&self, queue: QueueType) -> Vec<&ParsedRecord> {
        self.merged_view(&[queue])
    }

    /// Zoomed, time-ordered view across `queues`.
    pub fn merged_view(&self, queues: &[QueueType]) -> Vec<&ParsedRecord> {
        zoom::apply(self.merged(queues), self.zoom.as_ref())
            .into_iter()
            .map(|r| &r.record)
            .collect()
    }

    /// Every buffered record of `queues` on one timeline, ignoring zoom.
    pub fn merged(&self, queues: &[QueueType]) -> Vec<&BufferedRecord> {
        merge(
            queues
                .iter()
                .filter_map(|q| self.buffers.get(q))
                .flat_map(|b| b.records.iter()),
        )
    }

    /// Zoomed position fixes each paired with the latest `data_queue` record at or before it.
    pub fn aligned(&self, fix_queue: QueueType, data_queue: QueueType) -> Vec<AlignedFix<'_>> {
        let fixes = self.view(fix_queue);
        let data: Vec<&ParsedRecord> = merge(
            self.buffers
                .get(&data_queue)
                .into_iter()
                .flat_map(|b| b.records.iter()),
        )
        .into_iter()
        .map(|r| &r.record)
        .collect();
        align_asof(&fixes, &data)
    }

    /// End the session and drop the buffers.
    pub fn close(&mut self) {
        if self.status == WindowStatus::Closed {
            return;
        }
        obs::emit_session_closed(self.total_len());
        for buffer in self.buffers.values_mut() {
            buffer.records.clear();
        }
        self.zoom = None;
        self.status = WindowStatus::Closed;
    }

    /// Tail until `shutdown` flips to `true`, calling `on_update` after the
    /// first poll and after every poll that ingested records. Closes the
    /// window on exit.
    pub async fn run<F>(
        &mut self,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
        mut on_update: F,
    ) -> Result<()>
    where
        F: FnMut(&LiveWindow),
    {
        let session = self.session_id.to_string();
        let mut first = true;
        loop {
            if *shutdown.borrow() {
                break;
            }
            let ingested = {
                let _span = obs::SessionSpan::enter(&session);
                self.tail()?
            };
            if first || ingested > 0 {
                on_update(self);
                first = false;
            }

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.close();
        Ok(())
    }
}

/// Decode one queue-file line, dropping it on any structural mismatch.
fn decode_line(queue: QueueType, line: &TailLine) -> Option<ParsedRecord> {
    if line.bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    let result = match line.as_str() {
        Some(text) => ParsedRecord::from_line(text).map_err(|e| e.to_string()),
        None => Err("queue line is not valid UTF-8".to_string()),
    };
    match result {
        Ok(record) if record.queue == queue => Some(record),
        Ok(record) => {
            METRICS.inc_dropped();
            obs::emit_record_dropped(
                queue,
                line.index,
                &format!("record tagged {} found in {} file", record.queue, queue),
            );
            None
        }
        Err(err) => {
            METRICS.inc_dropped();
            obs::emit_record_dropped(queue, line.index, &err);
            None
        }
    }
}
