//! View bounds over a window buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BufferedRecord;

/// Inclusive time range; an open end is unbounded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| *ts >= s) && self.end.map_or(true, |e| *ts <= e)
    }
}

/// How far a view is narrowed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Zoom {
    /// The `n` most recent records by timestamp.
    Recent { count: usize },
    /// Records whose timestamp falls in the range.
    Range { range: TimeRange },
}

impl Zoom {
    pub fn recent(count: usize) -> Self {
        Zoom::Recent { count }
    }

    pub fn range(range: TimeRange) -> Self {
        Zoom::Range { range }
    }
}

/// Order `records` by `(timestamp, arrival)` and narrow them to `zoom`.
///
/// A count larger than the input is clamped to what is there.
pub fn apply<'a>(
    mut records: Vec<&'a BufferedRecord>,
    zoom: Option<&Zoom>,
) -> Vec<&'a BufferedRecord> {
    records.sort_by_key(|r| (r.record.timestamp, r.seq));
    match zoom {
        None => records,
        Some(Zoom::Recent { count }) => {
            let skip = records.len().saturating_sub(*count);
            records.split_off(skip)
        }
        Some(Zoom::Range { range }) => records
            .into_iter()
            .filter(|r| range.contains(&r.record.timestamp))
            .collect(),
    }
}
