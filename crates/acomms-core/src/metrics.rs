//! Global atomic counters for acomms observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a role shuts down).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    datagrams_received: AtomicU64,
    lines_classified: AtomicU64,
    lines_rejected: AtomicU64,
    records_tailed: AtomicU64,
    records_dropped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            datagrams_received: AtomicU64::new(0),
            lines_classified: AtomicU64::new(0),
            lines_rejected: AtomicU64::new(0),
            records_tailed: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
        }
    }

    pub fn inc_datagrams(&self) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "datagrams_received", "counter incremented");
    }

    pub fn inc_classified(&self) {
        self.lines_classified.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "lines_classified", "counter incremented");
    }

    pub fn inc_rejected(&self) {
        self.lines_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "lines_rejected", "counter incremented");
    }

    pub fn add_tailed(&self, n: u64) {
        self.records_tailed.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "records_tailed", by = n, "counter incremented");
    }

    pub fn inc_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "records_dropped", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            datagrams_received = self.datagrams_received(),
            lines_classified = self.lines_classified(),
            lines_rejected = self.lines_rejected(),
            records_tailed = self.records_tailed(),
            records_dropped = self.records_dropped(),
        );
    }

    pub fn datagrams_received(&self) -> u64 {
        self.datagrams_received.load(Ordering::Relaxed)
    }

    pub fn lines_classified(&self) -> u64 {
        self.lines_classified.load(Ordering::Relaxed)
    }

    pub fn lines_rejected(&self) -> u64 {
        self.lines_rejected.load(Ordering::Relaxed)
    }

    pub fn records_tailed(&self) -> u64 {
        self.records_tailed.load(Ordering::Relaxed)
    }

    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn reset(&self) {
        self.datagrams_received.store(0, Ordering::Relaxed);
        self.lines_classified.store(0, Ordering::Relaxed);
        self.lines_rejected.store(0, Ordering::Relaxed);
        self.records_tailed.store(0, Ordering::Relaxed);
        self.records_dropped.store(0, Ordering::Relaxed);
    }
}
