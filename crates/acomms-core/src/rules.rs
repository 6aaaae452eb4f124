//! Ordered classification rules.
//!
//! A raw line is routed by the first rule whose header check accepts it.
//! Only that rule parses the line; its parse error is final even if a later
//! rule could have read the payload. Classification depends on nothing but
//! the line text, its index and the [`ClassifierConfig`].

use std::collections::BTreeMap;

use regex::Regex;

use crate::config::ClassifierConfig;
use crate::domain::{
    ClassifyError, FieldValue, ParsedRecord, QueueType, RawLine, TORN_LINE_MARKER,
};

/// One header pattern and the grammar that goes with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// `USBL,<id>,<lat>,<lon>,<depth>`
    UsblFix,
    /// `VFR <date> <time> <src> <target> <solution> <lon> <lat> <depth> ...`
    VfrFix,
    /// `<tag>,STATUS|SCIENCE,key=value,...`
    KeyValue,
    /// Acoustic SMS carrying `SDQ <n>:<payload>`.
    Sdq,
}

impl Rule {
    /// Default evaluation order.
    pub const DEFAULT_ORDER: [Rule; 4] = [Rule::UsblFix, Rule::VfrFix, Rule::KeyValue, Rule::Sdq];

    pub fn name(&self) -> &'static str {
        match self {
            Rule::UsblFix => "usbl_fix",
            Rule::VfrFix => "vfr_fix",
            Rule::KeyValue => "key_value",
            Rule::Sdq => "sdq",
        }
    }
}

/// Field layout of the SDQ status payload.
enum Slot {
    Number(&'static str),
    Text(&'static str),
    Reserved,
}

const STATUS_LAYOUT: [Slot; 21] = [
    Slot::Number("pos_ned_x"),
    Slot::Number("pos_ned_y"),
    Slot::Number("pos_ned_z"),
    Slot::Number("altitude"),
    Slot::Number("heading"),
    Slot::Number("horz_velocity"),
    Slot::Number("vert_velocity"),
    Slot::Text("abort_status"),
    Slot::Number("ins_status"),
    Slot::Number("battery_pct"),
    Slot::Number("goal_ned_x"),
    Slot::Number("goal_ned_y"),
    Slot::Number("goal_ned_z"),
    Slot::Reserved,
    Slot::Reserved,
    Slot::Reserved,
    Slot::Reserved,
    Slot::Reserved,
    Slot::Reserved,
    Slot::Reserved,
    Slot::Number("trackline"),
];

const SCIENCE_LAYOUT: [&str; 6] = [
    "oxygen_concentration",
    "obs_raw",
    "orp_raw",
    "ctd_temperature",
    "ctd_salinity",
    "paro_depth",
];

const VFR_MIN_TOKENS: usize = 9;

/// The ordered rule list plus the constants it routes by.
#[derive(Debug, Clone)]
pub struct RuleSet {
    config: ClassifierConfig,
    rules: Vec<Rule>,
    sdq_header: Regex,
}

impl RuleSet {
    pub fn new(config: ClassifierConfig) -> Self {
        Self::with_rules(config, Rule::DEFAULT_ORDER.to_vec())
    }

    /// Build with an explicit rule order.
    pub fn with_rules(config: ClassifierConfig, rules: Vec<Rule>) -> Self {
        Self {
            config,
            rules,
            sdq_header: Regex::new(r"SDQ\s*(\d+)\s*:").expect("SDQ header pattern is valid"),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify raw log bytes (one line, no terminator).
    pub fn classify_bytes(&self, bytes: &[u8], index: u64) -> Result<ParsedRecord, ClassifyError> {
        if bytes.last() == Some(&TORN_LINE_MARKER) {
            return Err(ClassifyError::TornLine);
        }
        let text = std::str::from_utf8(bytes).map_err(|_| ClassifyError::InvalidUtf8)?;
        self.classify_line(text, index)
    }

    /// Classify one raw log line.
    pub fn classify_line(&self, line: &str, index: u64) -> Result<ParsedRecord, ClassifyError> {
        let raw = RawLine::parse(line)?;
        let rule = self
            .rules
            .iter()
            .copied()
            .find(|rule| self.accepts(*rule, &raw))
            .ok_or_else(|| ClassifyError::UnknownHeader(header_of(&raw)))?;

        let (queue, fields) = match rule {
            Rule::UsblFix => self.parse_usbl(&raw)?,
            Rule::VfrFix => self.parse_vfr(&raw)?,
            Rule::KeyValue => parse_key_value(&raw)?,
            Rule::Sdq => self.parse_sdq(&raw)?,
        };

        Ok(ParsedRecord {
            timestamp: raw.timestamp,
            queue,
            source_line: index,
            fields,
        })
    }

    fn accepts(&self, rule: Rule, raw: &RawLine<'_>) -> bool {
        let (tag, payload) = raw.tag_and_payload();
        match rule {
            Rule::UsblFix => tag.eq_ignore_ascii_case("USBL"),
            Rule::VfrFix => raw.datagram.trim_start().starts_with("VFR "),
            Rule::KeyValue => {
                let header = payload.split(',').next().unwrap_or("").trim();
                header.eq_ignore_ascii_case("STATUS") || header.eq_ignore_ascii_case("SCIENCE")
            }
            Rule::Sdq => self.sdq_header.is_match(raw.datagram),
        }
    }

    fn asset_queue(&self, id: &str) -> QueueType {
        if self.config.is_vehicle(id) {
            QueueType::PositionFix
        } else if self.config.is_ship(id) {
            QueueType::Ship
        } else {
            QueueType::OtherAsset
        }
    }

    fn parse_usbl(&self, raw: &RawLine<'_>) -> Result<(QueueType, Fields), ClassifyError> {
        let (_, payload) = raw.tag_and_payload();
        let tokens: Vec<&str> = payload.split(',').map(str::trim).collect();
        if tokens.len() != 4 {
            return Err(ClassifyError::FieldCount {
                queue: "usbl".to_string(),
                expected: 4,
                actual: tokens.len(),
            });
        }
        let id = tokens[0];
        if id.is_empty() {
            return Err(ClassifyError::EmptyField("id".to_string()));
        }

        let mut fields = Fields::new();
        fields.insert("id".to_string(), FieldValue::Text(id.to_string()));
        fields.insert("latitude".to_string(), float("latitude", tokens[1])?);
        fields.insert("longitude".to_string(), float("longitude", tokens[2])?);
        fields.insert("depth".to_string(), float("depth", tokens[3])?);
        Ok((self.asset_queue(id), fields))
    }

    fn parse_vfr(&self, raw: &RawLine<'_>) -> Result<(QueueType, Fields), ClassifyError> {
        let tokens: Vec<&str> = raw.datagram.split_whitespace().collect();
        if tokens.len() < VFR_MIN_TOKENS {
            return Err(ClassifyError::FieldCount {
                queue: "vfr".to_string(),
                expected: VFR_MIN_TOKENS,
                actual: tokens.len(),
            });
        }
        let target = tokens[4];
        let solution = tokens[5];

        let queue = if self.config.is_vehicle(target) && solution.contains("USBL") {
            QueueType::PositionFix
        } else if self.config.is_ship(target) && solution.contains("SOLN_GPS0") {
            QueueType::Ship
        } else if self.config.is_other_asset(target) && solution.contains("USBL") {
            QueueType::OtherAsset
        } else {
            return Err(ClassifyError::UnknownHeader(format!(
                "VFR target {target} solution {solution}"
            )));
        };

        let mut fields = Fields::new();
        fields.insert("id".to_string(), FieldValue::Text(target.to_string()));
        fields.insert("longitude".to_string(), float("longitude", tokens[6])?);
        fields.insert("latitude".to_string(), float("latitude", tokens[7])?);
        fields.insert("depth".to_string(), float("depth", tokens[8])?);
        fields.insert(
            "fix_time".to_string(),
            FieldValue::Text(format!("{} {}", tokens[1].replace('/', "-"), tokens[2])),
        );
        fields.insert("solution".to_string(), FieldValue::Text(solution.to_string()));
        Ok((queue, fields))
    }

    fn parse_sdq(&self, raw: &RawLine<'_>) -> Result<(QueueType, Fields), ClassifyError> {
        let caps = self
            .sdq_header
            .captures(raw.datagram)
            .ok_or_else(|| ClassifyError::UnknownHeader(header_of(raw)))?;
        let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let number = &caps[1];
        let sdq: u32 = number
            .parse()
            .map_err(|_| ClassifyError::UnknownHeader(format!("SDQ {number}")))?;
        let payload = raw.datagram[whole..].trim();
        if payload.is_empty() {
            return Err(ClassifyError::EmptyPayload);
        }

        if sdq == self.config.status_sdq {
            Ok((QueueType::Status, parse_status_sdq(payload)?))
        } else if sdq == self.config.science_sdq {
            Ok((QueueType::Science, parse_science_sdq(payload)?))
        } else if self.config.experimental_sdq.contains(&sdq) {
            let mut fields = Fields::new();
            fields.insert("sdq".to_string(), FieldValue::Int(i64::from(sdq)));
            for (i, token) in payload.split(',').enumerate() {
                fields.insert(format!("f{i}"), FieldValue::infer(token));
            }
            Ok((QueueType::Experimental, fields))
        } else {
            Err(ClassifyError::UnknownHeader(format!("SDQ {sdq}")))
        }
    }
}

type Fields = BTreeMap<String, FieldValue>;

fn header_of(raw: &RawLine<'_>) -> String {
    let (tag, payload) = raw.tag_and_payload();
    let next = payload.split(',').next().unwrap_or("").trim();
    if next.is_empty() {
        tag.to_string()
    } else {
        format!("{tag},{next}")
    }
}

fn float(field: &str, token: &str) -> Result<FieldValue, ClassifyError> {
    crate::domain::parse_finite(token)
        .map(FieldValue::Float)
        .ok_or_else(|| ClassifyError::NotNumeric {
            field: field.to_string(),
            value: token.trim().to_string(),
        })
}

fn number(field: &str, token: &str) -> Result<FieldValue, ClassifyError> {
    match FieldValue::infer(token) {
        FieldValue::Text(value) => Err(ClassifyError::NotNumeric {
            field: field.to_string(),
            value,
        }),
        numeric => Ok(numeric),
    }
}

fn parse_key_value(raw: &RawLine<'_>) -> Result<(QueueType, Fields), ClassifyError> {
    let (_, payload) = raw.tag_and_payload();
    let mut parts = payload.split(',');
    let header = parts.next().unwrap_or("").trim();
    let queue = if header.eq_ignore_ascii_case("STATUS") {
        QueueType::Status
    } else {
        QueueType::Science
    };

    let mut fields = Fields::new();
    for pair in parts {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ClassifyError::MalformedPair(pair.trim().to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ClassifyError::MalformedPair(pair.trim().to_string()));
        }
        if fields
            .insert(key.to_string(), FieldValue::infer(value))
            .is_some()
        {
            return Err(ClassifyError::DuplicateKey(key.to_string()));
        }
    }
    if fields.is_empty() {
        return Err(ClassifyError::EmptyPayload);
    }
    Ok((queue, fields))
}

fn parse_status_sdq(payload: &str) -> Result<Fields, ClassifyError> {
    let tokens: Vec<&str> = payload.split(',').map(str::trim).collect();
    if tokens.len() != STATUS_LAYOUT.len() {
        return Err(ClassifyError::FieldCount {
            queue: QueueType::Status.to_string(),
            expected: STATUS_LAYOUT.len(),
            actual: tokens.len(),
        });
    }
    let mut fields = Fields::new();
    for (slot, token) in STATUS_LAYOUT.iter().zip(tokens) {
        match slot {
            Slot::Number(name) => {
                fields.insert((*name).to_string(), number(name, token)?);
            }
            Slot::Text(name) => {
                fields.insert((*name).to_string(), FieldValue::Text(token.to_string()));
            }
            Slot::Reserved => {}
        }
    }
    Ok(fields)
}

fn parse_science_sdq(payload: &str) -> Result<Fields, ClassifyError> {
    let tokens: Vec<&str> = payload.split_whitespace().collect();
    if tokens.len() != SCIENCE_LAYOUT.len() {
        return Err(ClassifyError::FieldCount {
            queue: QueueType::Science.to_string(),
            expected: SCIENCE_LAYOUT.len(),
            actual: tokens.len(),
        });
    }
    SCIENCE_LAYOUT
        .iter()
        .zip(tokens)
        .map(|(name, token)| number(name, token).map(|value| ((*name).to_string(), value)))
        .collect()
}
