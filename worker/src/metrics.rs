//! Pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Pipeline metrics.
#[derive(Debug)]
pub struct PipelineMetrics {
    /// Fetcher runs started.
    pub fetch_runs: AtomicU64,
    /// Fetcher runs that published a snapshot.
    pub fetch_published: AtomicU64,
    /// Fetcher runs that ended in an error.
    pub fetch_failures: AtomicU64,
    /// Currency rate publications.
    pub currency_rate_runs: AtomicU64,
    /// Direction rate runs started.
    pub direction_runs: AtomicU64,
    /// Direction rate runs that ended in an error.
    pub direction_failures: AtomicU64,
    /// Rows written by every stage.
    pub rows_written: AtomicU64,
    /// Rows skipped after a recoverable error.
    pub rows_skipped: AtomicU64,
    /// Faults reported to the fault tracker.
    pub faults: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            fetch_runs: AtomicU64::new(0),
            fetch_published: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            currency_rate_runs: AtomicU64::new(0),
            direction_runs: AtomicU64::new(0),
            direction_failures: AtomicU64::new(0),
            rows_written: AtomicU64::new(0),
            rows_skipped: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    pub fn fetch_started(&self) {
        self.fetch_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_finished(&self, published: bool, written: usize, skipped: usize) {
        if published {
            self.fetch_published.fetch_add(1, Ordering::Relaxed);
        }
        self.rows(written, skipped);
    }

    pub fn fetch_failed(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn currency_rates_published(&self, written: usize, skipped: usize) {
        self.currency_rate_runs.fetch_add(1, Ordering::Relaxed);
        self.rows(written, skipped);
    }

    pub fn direction_started(&self) {
        self.direction_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn direction_finished(&self, written: usize, skipped: usize, faults: usize) {
        self.rows(written, skipped);
        self.faults.fetch_add(faults as u64, Ordering::Relaxed);
    }

    pub fn direction_failed(&self) {
        self.direction_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn rows(&self, written: usize, skipped: usize) {
        self.rows_written.fetch_add(written as u64, Ordering::Relaxed);
        self.rows_skipped.fetch_add(skipped as u64, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fetch_runs: self.fetch_runs.load(Ordering::Relaxed),
            fetch_published: self.fetch_published.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            currency_rate_runs: self.currency_rate_runs.load(Ordering::Relaxed),
            direction_runs: self.direction_runs.load(Ordering::Relaxed),
            direction_failures: self.direction_failures.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            rows_skipped: self.rows_skipped.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let counters = [
            ("gera_fetch_runs_total", "Fetcher runs started", snapshot.fetch_runs),
            ("gera_fetch_published_total", "Fetcher runs that published", snapshot.fetch_published),
            ("gera_fetch_failures_total", "Fetcher runs that failed", snapshot.fetch_failures),
            ("gera_currency_rate_runs_total", "Currency rate publications", snapshot.currency_rate_runs),
            ("gera_direction_runs_total", "Direction rate runs started", snapshot.direction_runs),
            ("gera_direction_failures_total", "Direction rate runs that failed", snapshot.direction_failures),
            ("gera_rows_written_total", "Rows written", snapshot.rows_written),
            ("gera_rows_skipped_total", "Rows skipped", snapshot.rows_skipped),
            ("gera_faults_total", "Faults reported", snapshot.faults),
        ];

        let mut output = String::new();
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n\n"));
        }
        output
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub fetch_runs: u64,
    pub fetch_published: u64,
    pub fetch_failures: u64,
    pub currency_rate_runs: u64,
    pub direction_runs: u64,
    pub direction_failures: u64,
    pub rows_written: u64,
    pub rows_skipped: u64,
    pub faults: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<PipelineMetrics>;
