//! Synthetic datagram source for exercising the pipeline without a vehicle.
//!
//! Messages follow the same wire grammars the classifier reads, so every
//! synthetic datagram lands in a queue.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::domain::{AcommsError, Result};

/// Deterministic pseudo-random source (64-bit LCG).
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in `[lo, hi)`.
    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Uniform in `0..n`; `n` must be non-zero.
    pub fn below(&mut self, n: usize) -> usize {
        (self.next_u64() >> 33) as usize % n
    }
}

/// Kind of synthetic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `SMS>...|SDQ 0:` vehicle status.
    SdqStatus,
    /// `SMS>...|SDQ 34:` science sample.
    SdqScience,
    /// `USBL,<id>,<lat>,<lon>,<depth>`
    UsblFix,
    /// `<tag>,STATUS,key=value,...`
    KeyValueStatus,
    /// `VFR ...` fix report.
    VfrFix,
}

impl MessageKind {
    pub const ALL: [MessageKind; 5] = [
        MessageKind::SdqStatus,
        MessageKind::SdqScience,
        MessageKind::UsblFix,
        MessageKind::KeyValueStatus,
        MessageKind::VfrFix,
    ];
}

pub fn sdq_status(rng: &mut Lcg) -> String {
    let mut fields = vec![
        format!("{}", (rng.next_f64() * 560.0).round()),
        format!("{}", (rng.next_f64() * 230.0).round()),
        format!("{}", (rng.range(1500.0, 2600.0)).round()),
        format!("{:.1}", rng.range(20.0, 80.0)),
        format!("{:.1}", rng.range(0.0, 360.0)),
        format!("{:.2}", rng.range(0.0, 1.5)),
        format!("{:.2}", rng.range(-0.2, 0.2)),
        "A0".to_string(),
        "0".to_string(),
        format!("{:.1}", rng.range(20.0, 100.0)),
        format!("{}", (rng.next_f64() * 560.0).round()),
        format!("{}", (rng.next_f64() * 230.0).round()),
        format!("{}", (rng.range(1500.0, 2600.0)).round()),
    ];
    fields.extend(std::iter::repeat("0".to_string()).take(7));
    fields.push(format!("{}", rng.below(300)));
    format!("SMS:5509,B1,R1,A0|SDQ 0:{}", fields.join(","))
}

pub fn sdq_science(rng: &mut Lcg) -> String {
    format!(
        "SMS:5509,B1,R1,A0|SDQ 34:{:.2} {:.3} {:.3} {:.3} {:.3} {:.1}",
        rng.range(150.0, 260.0),
        rng.range(0.0, 0.1),
        rng.range(-50.0, 50.0),
        rng.range(1.5, 4.0),
        rng.range(34.0, 35.0),
        rng.range(1500.0, 2600.0),
    )
}

pub fn usbl_fix(rng: &mut Lcg, id: &str) -> String {
    format!(
        "USBL,{id},{:.6},{:.6},{:.1}",
        rng.range(27.0, 27.1),
        rng.range(-111.5, -111.4),
        rng.range(1500.0, 2000.0),
    )
}

pub fn key_value_status(rng: &mut Lcg, tag: &str) -> String {
    format!(
        "{tag},STATUS,battery={},heading={}",
        rng.below(101),
        rng.below(360),
    )
}

/// A vehicle USBL fix report measured at `at`.
pub fn vfr_fix(rng: &mut Lcg, target: &str, at: DateTime<Utc>) -> String {
    format!(
        "VFR {} 2 {target} SOLN_USBL {:.6} {:.6} {:.3} 0.000 10 0.00 0.00",
        at.format("%Y/%m/%d %H:%M:%S%.3f"),
        rng.range(-111.5, -111.4),
        rng.range(27.0, 27.1),
        -rng.range(1500.0, 2000.0),
    )
}

enum Source {
    Synthetic(Vec<MessageKind>),
    Replay { lines: Vec<String>, next: usize },
}

/// Produces one datagram text per call.
pub struct Spoofer {
    rng: Lcg,
    vehicle: String,
    source: Source,
}

impl Spoofer {
    /// Random mix of `kinds` (all kinds if empty) for `vehicle`.
    pub fn synthetic(seed: u64, vehicle: impl Into<String>, kinds: &[MessageKind]) -> Self {
        let kinds = if kinds.is_empty() {
            MessageKind::ALL.to_vec()
        } else {
            kinds.to_vec()
        };
        Self {
            rng: Lcg::new(seed),
            vehicle: vehicle.into(),
            source: Source::Synthetic(kinds),
        }
    }

    /// Cycle through the non-empty lines of `path`.
    pub fn replay(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let lines: Vec<String> = text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        if lines.is_empty() {
            return Err(AcommsError::Config(format!(
                "replay file {} has no lines",
                path.display()
            )));
        }
        Ok(Self {
            rng: Lcg::new(0),
            vehicle: String::new(),
            source: Source::Replay { lines, next: 0 },
        })
    }

    pub fn next_message(&mut self) -> String {
        match &mut self.source {
            Source::Replay { lines, next } => {
                let line = lines[*next % lines.len()].clone();
                *next += 1;
                line
            }
            Source::Synthetic(kinds) => {
                let kind = kinds[self.rng.below(kinds.len())];
                self.generate(kind)
            }
        }
    }

    pub fn generate(&mut self, kind: MessageKind) -> String {
        let rng = &mut self.rng;
        match kind {
            MessageKind::SdqStatus => sdq_status(rng),
            MessageKind::SdqScience => sdq_science(rng),
            MessageKind::UsblFix => usbl_fix(rng, &self.vehicle),
            MessageKind::KeyValueStatus => key_value_status(rng, &self.vehicle),
            MessageKind::VfrFix => vfr_fix(rng, &self.vehicle, Utc::now()),
        }
    }
}

/// Send datagrams to `target` every `interval` until `shutdown` flips to
/// `true` or `limit` messages are out. Returns the number sent.
pub async fn send(
    spoofer: &mut Spoofer,
    target: SocketAddr,
    interval: Duration,
    limit: Option<u64>,
    echo: bool,
    mut shutdown: watch::Receiver<bool>,
) -> Result<u64> {
    let bind_addr: SocketAddr = if target.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| AcommsError::Transport(format!("bind failed: {e}")))?;

    let mut sent = 0u64;
    while limit.map_or(true, |n| sent < n) {
        if *shutdown.borrow() {
            break;
        }
        let message = spoofer.next_message();
        if echo {
            println!("{message}");
        }
        socket
            .send_to(message.as_bytes(), target)
            .await
            .map_err(|e| AcommsError::Transport(format!("send failed: {e}")))?;
        sent += 1;
        tracing::debug!(sent = sent, bytes = message.len(), "spoofed datagram sent");

        if limit.is_some_and(|n| sent >= n) {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    Ok(sent)
}
