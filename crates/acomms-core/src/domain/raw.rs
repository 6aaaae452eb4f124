//! Raw log entries.
//!
//! A raw log line is `<timestamp>,<source-tag>,<payload...>`: the receipt
//! time written by the listener followed by the datagram text verbatim.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use super::error::ClassifyError;

/// Byte that closes a raw log line cut short by a crashed writer.
///
/// Never valid UTF-8, and the listener decodes datagrams lossily, so no
/// complete entry can contain it.
pub const TORN_LINE_MARKER: u8 = 0xFF;

/// A datagram as received, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub receipt_time: DateTime<Utc>,
    pub source_address: String,
    pub payload: String,
}

impl RawMessage {
    pub fn new(
        receipt_time: DateTime<Utc>,
        source_address: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            receipt_time,
            source_address: source_address.into(),
            payload: payload.into(),
        }
    }

    /// Render the raw log line, newline-terminated.
    ///
    /// The payload must already be a single line; see [`split_datagram`].
    pub fn to_log_line(&self) -> String {
        format!("{},{}\n", format_receipt_time(&self.receipt_time), self.payload)
    }
}

/// Receipt timestamps are RFC 3339 UTC with microsecond precision.
pub fn format_receipt_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Split datagram text into the non-empty lines that become raw log entries.
///
/// Trailing CR/LF and surrounding blank lines are dropped; an embedded line
/// break starts a new entry so the log stays one message per line.
pub fn split_datagram(text: &str) -> Vec<&str> {
    text.split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .collect()
}

/// Accepted timestamp spellings: RFC 3339 with an offset, or a naive
/// ISO 8601 date-time (either `T` or space separated) taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ClassifyError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| ClassifyError::BadTimestamp(raw.to_string()))
}

/// A raw log line split into its envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine<'a> {
    pub timestamp: DateTime<Utc>,
    /// Everything after the timestamp: `<source-tag>,<payload...>`.
    pub datagram: &'a str,
}

impl<'a> RawLine<'a> {
    pub fn parse(line: &'a str) -> Result<Self, ClassifyError> {
        let (ts, datagram) = line.split_once(',').ok_or(ClassifyError::MissingDelimiter)?;
        let timestamp = parse_timestamp(ts)?;
        if datagram.trim().is_empty() {
            return Err(ClassifyError::EmptyPayload);
        }
        Ok(Self {
            timestamp,
            datagram,
        })
    }

    /// The leading source tag and the payload after it.
    ///
    /// A datagram without a comma is all tag and no payload.
    pub fn tag_and_payload(&self) -> (&'a str, &'a str) {
        match self.datagram.split_once(',') {
            Some((tag, payload)) => (tag.trim(), payload),
            None => (self.datagram.trim(), ""),
        }
    }
}
