//! Cruise-specific configuration.
//!
//! Queue numbers and asset identifiers change between cruises, so they are
//! data rather than constants. Defaults match the SENTRY/Jason deployment;
//! every value can be overridden from `ACOMMS_*` environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{AcommsError, Result};

/// Classification constants: SDQ queue numbers and USBL asset identifiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// SDQ number of the vehicle status queue.
    pub status_sdq: u32,

    /// SDQ number of the scalar science queue.
    pub science_sdq: u32,

    /// SDQ numbers routed to the experimental queue.
    pub experimental_sdq: Vec<u32>,

    /// Names or numeric USBL target ids of the vehicle.
    pub vehicle_ids: Vec<String>,

    /// Names or numeric USBL target ids of the ship.
    pub ship_ids: Vec<String>,

    /// Names or numeric USBL target ids of other tracked assets.
    pub other_asset_ids: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            status_sdq: 0,
            science_sdq: 34,
            experimental_sdq: vec![100, 101],
            vehicle_ids: vec!["SENTRY".to_string(), "0".to_string()],
            ship_ids: vec!["SHIP".to_string(), "2".to_string()],
            other_asset_ids: vec![
                "JASON".to_string(),
                "1".to_string(),
                "CTD".to_string(),
                "5".to_string(),
            ],
        }
    }
}

impl ClassifierConfig {
    /// Load from environment variables, falling back to defaults per field.
    ///
    /// - `ACOMMS_STATUS_SDQ`, `ACOMMS_SCIENCE_SDQ`: integers
    /// - `ACOMMS_EXPERIMENTAL_SDQ`: comma-separated integers
    /// - `ACOMMS_VEHICLE_IDS`, `ACOMMS_SHIP_IDS`, `ACOMMS_OTHER_ASSET_IDS`: comma-separated ids
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            status_sdq: env_u32("ACOMMS_STATUS_SDQ")?.unwrap_or(defaults.status_sdq),
            science_sdq: env_u32("ACOMMS_SCIENCE_SDQ")?.unwrap_or(defaults.science_sdq),
            experimental_sdq: match std::env::var("ACOMMS_EXPERIMENTAL_SDQ") {
                Ok(v) => parse_u32_list("ACOMMS_EXPERIMENTAL_SDQ", &v)?,
                Err(_) => defaults.experimental_sdq,
            },
            vehicle_ids: env_list("ACOMMS_VEHICLE_IDS").unwrap_or(defaults.vehicle_ids),
            ship_ids: env_list("ACOMMS_SHIP_IDS").unwrap_or(defaults.ship_ids),
            other_asset_ids: env_list("ACOMMS_OTHER_ASSET_IDS")
                .unwrap_or(defaults.other_asset_ids),
        })
    }

    pub fn is_vehicle(&self, id: &str) -> bool {
        contains_id(&self.vehicle_ids, id)
    }

    pub fn is_ship(&self, id: &str) -> bool {
        contains_id(&self.ship_ids, id)
    }

    pub fn is_other_asset(&self, id: &str) -> bool {
        contains_id(&self.other_asset_ids, id)
    }
}

fn contains_id(ids: &[String], id: &str) -> bool {
    ids.iter().any(|known| known.eq_ignore_ascii_case(id.trim()))
}

fn env_u32(key: &str) -> Result<Option<u32>> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AcommsError::Config(format!("{key} must be an integer, got {v:?}"))),
        Err(_) => Ok(None),
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

fn parse_u32_list(key: &str, raw: &str) -> Result<Vec<u32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| AcommsError::Config(format!("{key} entry is not an integer: {s:?}")))
        })
        .collect()
}

/// Live window sizing and polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    /// Maximum records kept per queue buffer.
    pub capacity: usize,

    /// Delay between tail polls.
    pub poll_interval: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: 3600,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl WindowConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(AcommsError::Config("window capacity must be positive".into()));
        }
        self.capacity = capacity;
        Ok(self)
    }
}
