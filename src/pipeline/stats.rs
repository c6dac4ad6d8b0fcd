//! Counters shared by every file task of a scan.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Live statistics for one scan
#[derive(Debug, Default)]
pub struct RunStats {
    files_started: AtomicU64,
    files_succeeded: AtomicU64,
    files_failed: AtomicU64,
    events: AtomicU64,
    anomalies: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Point-in-time copy of `RunStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub files_started: u64,
    pub files_succeeded: u64,
    pub files_failed: u64,
    pub events: u64,
    pub anomalies: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a file as being decoded until the guard drops
    pub fn enter(&self) -> InFlightGuard<'_> {
        self.files_started.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard { stats: self }
    }

    pub fn record_success(&self, events: u64, anomalies: u64) {
        self.files_succeeded.fetch_add(1, Ordering::Relaxed);
        self.events.fetch_add(events, Ordering::Relaxed);
        self.anomalies.fetch_add(anomalies, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            files_started: self.files_started.load(Ordering::Relaxed),
            files_succeeded: self.files_succeeded.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
        }
    }
}

/// Decrements the in-flight count on drop
pub struct InFlightGuard<'a> {
    stats: &'a RunStats,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
