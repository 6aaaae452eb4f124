//! Queue tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Category a classified message is routed to.
///
/// Decided from line content only. Every variant owns one queue file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueueType {
    /// USBL fix of the vehicle.
    PositionFix,
    /// Vehicle status (SDQ 0 or `STATUS` key/value payloads).
    Status,
    /// Scalar science (SDQ 34 or `SCIENCE` key/value payloads).
    Science,
    /// Ship GPS fix.
    Ship,
    /// Fix of any other tracked asset (ROV, CTD rosette, ...).
    OtherAsset,
    /// Experimental instrument queues.
    Experimental,
}

impl QueueType {
    pub const ALL: [QueueType; 6] = [
        QueueType::PositionFix,
        QueueType::Status,
        QueueType::Science,
        QueueType::Ship,
        QueueType::OtherAsset,
        QueueType::Experimental,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueType::PositionFix => "position_fix",
            QueueType::Status => "status",
            QueueType::Science => "science",
            QueueType::Ship => "ship",
            QueueType::OtherAsset => "other_asset",
            QueueType::Experimental => "experimental",
        }
    }

    /// Whether records in this queue carry the `id/latitude/longitude/depth` schema.
    pub fn is_positional(&self) -> bool {
        matches!(
            self,
            QueueType::PositionFix | QueueType::Ship | QueueType::OtherAsset
        )
    }

    /// File name of the queue inside a queue directory.
    pub fn file_name(&self) -> String {
        format!("{}.jsonl", self.as_str())
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        QueueType::ALL
            .into_iter()
            .find(|q| q.as_str() == normalized)
            .ok_or_else(|| format!("unknown queue: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_dashes_and_case() {
        assert_eq!(
            "Position-Fix".parse::<QueueType>().unwrap(),
            QueueType::PositionFix
        );
        assert_eq!("other_asset".parse::<QueueType>().unwrap(), QueueType::OtherAsset);
        assert!("navigation".parse::<QueueType>().is_err());
    }

    #[test]
    fn serde_tag_matches_as_str() {
        for q in QueueType::ALL {
            let json = serde_json::to_string(&q).unwrap();
            assert_eq!(json, format!("\"{}\"", q.as_str()));
        }
    }

    #[test]
    fn positional_queues() {
        assert!(QueueType::Ship.is_positional());
        assert!(!QueueType::Science.is_positional());
        assert_eq!(QueueType::Status.file_name(), "status.jsonl");
    }
}
