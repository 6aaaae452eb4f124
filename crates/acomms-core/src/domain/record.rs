//! Classified records and their canonical queue-file encoding.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::queue::QueueType;

/// A single decoded field value.
///
/// Serialized untagged so queue files read as plain JSON: `85`, `31.402`, `"A0"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Infer the narrowest value type for a raw token.
    ///
    /// Non-finite floats (`nan`, `inf`) stay text so every value survives a
    /// JSON round trip.
    pub fn infer(token: &str) -> Self {
        let token = token.trim();
        if let Ok(i) = token.parse::<i64>() {
            return FieldValue::Int(i);
        }
        match parse_finite(token) {
            Some(f) => FieldValue::Float(f),
            None => FieldValue::Text(token.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// Parse a finite float. Rejects `nan`, `inf` and friends.
pub fn parse_finite(token: &str) -> Option<f64> {
    token.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

/// A classified message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedRecord {
    /// Receipt time copied from the raw log line.
    pub timestamp: DateTime<Utc>,

    /// Queue the record was routed to.
    pub queue: QueueType,

    /// Zero-based index of the raw log line the record came from.
    ///
    /// In memory only. Queue files depend on the message alone, so a
    /// rejected line never changes the bytes written for its neighbours.
    /// Decoded records carry `0`.
    #[serde(skip)]
    pub source_line: u64,

    /// Decoded fields, sorted by name.
    pub fields: BTreeMap<String, FieldValue>,
}

impl ParsedRecord {
    pub fn new(timestamp: DateTime<Utc>, queue: QueueType, source_line: u64) -> Self {
        Self {
            timestamp,
            queue,
            source_line,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insert.
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Canonical single-line encoding used in queue files (no trailing newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode one queue-file line.
    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}
