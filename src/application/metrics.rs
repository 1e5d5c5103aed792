//! Counters describing limiter behavior.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking rate limiting statistics.
///
/// Cloning shares the underlying counters, so a clone handed to a health
/// endpoint sees the same numbers as the limiter.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    requests_allowed: AtomicU64,
    requests_limited: AtomicU64,
    sweeps_run: AtomicU64,
    records_purged: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_allowed(&self) {
        self.inner.requests_allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_limited(&self) {
        self.inner.requests_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sweep(&self, purged: usize) {
        self.inner.sweeps_run.fetch_add(1, Ordering::Relaxed);
        self.inner
            .records_purged
            .fetch_add(purged as u64, Ordering::Relaxed);
    }

    /// Total requests allowed.
    pub fn requests_allowed(&self) -> u64 {
        self.inner.requests_allowed.load(Ordering::Relaxed)
    }

    /// Total requests rejected because their window was full.
    pub fn requests_limited(&self) -> u64 {
        self.inner.requests_limited.load(Ordering::Relaxed)
    }

    /// Number of cleanup sweeps executed.
    pub fn sweeps_run(&self) -> u64 {
        self.inner.sweeps_run.load(Ordering::Relaxed)
    }

    /// Expired records removed by sweeps.
    pub fn records_purged(&self) -> u64 {
        self.inner.records_purged.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_allowed: self.requests_allowed(),
            requests_limited: self.requests_limited(),
            sweeps_run: self.sweeps_run(),
            records_purged: self.records_purged(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.requests_allowed.store(0, Ordering::Relaxed);
        self.inner.requests_limited.store(0, Ordering::Relaxed);
        self.inner.sweeps_run.store(0, Ordering::Relaxed);
        self.inner.records_purged.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub requests_allowed: u64,
    pub requests_limited: u64,
    pub sweeps_run: u64,
    pub records_purged: u64,
}

impl MetricsSnapshot {
    /// Share of requests that were limited (0.0 to 1.0).
    ///
    /// Returns 0.0 if nothing has been checked yet.
    pub fn limited_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.requests_limited as f64 / total as f64
        }
    }

    /// Allowed plus limited.
    pub fn total_requests(&self) -> u64 {
        self.requests_allowed.saturating_add(self.requests_limited)
    }
}
