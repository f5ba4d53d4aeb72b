// Run counters for the recalculation engine

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated as runs finish
#[derive(Debug, Default)]
pub struct RunMetrics {
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    runs_rejected: AtomicU64,
    rows_written: AtomicU64,
    standings_written: AtomicU64,
    last_duration_ms: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunMetricsSnapshot {
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub runs_rejected: u64,
    pub rows_written: u64,
    pub standings_written: u64,
    pub last_duration_ms: u64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_completed(&self, rows: usize, standings: usize, duration_ms: u64) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.rows_written.fetch_add(rows as u64, Ordering::Relaxed);
        self.standings_written.fetch_add(standings as u64, Ordering::Relaxed);
        self.last_duration_ms.store(duration_ms, Ordering::Relaxed);
    }

    pub fn record_failed(&self, duration_ms: u64) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        self.last_duration_ms.store(duration_ms, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.runs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunMetricsSnapshot {
        RunMetricsSnapshot {
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_rejected: self.runs_rejected.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            standings_written: self.standings_written.load(Ordering::Relaxed),
            last_duration_ms: self.last_duration_ms.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = RunMetrics::new();
        metrics.record_completed(12, 3, 40);
        metrics.record_completed(12, 3, 25);
        metrics.record_failed(5);
        metrics.record_rejected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs_completed, 2);
        assert_eq!(snapshot.runs_failed, 1);
        assert_eq!(snapshot.runs_rejected, 1);
        assert_eq!(snapshot.rows_written, 24);
        assert_eq!(snapshot.standings_written, 6);
        assert_eq!(snapshot.last_duration_ms, 5);
    }
}
