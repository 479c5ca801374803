use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Counters shared by all workers of a run
#[derive(Debug, Clone)]
pub struct ScanMetrics {
    lines_emitted: Arc<AtomicU64>,
    bytes_read: Arc<AtomicU64>,
    workers_succeeded: Arc<AtomicU64>,
    workers_failed: Arc<AtomicU64>,
}

impl ScanMetrics {
    /// Creates a new ScanMetrics instance
    pub fn new() -> Self {
        Self {
            lines_emitted: Arc::new(AtomicU64::new(0)),
            bytes_read: Arc::new(AtomicU64::new(0)),
            workers_succeeded: Arc::new(AtomicU64::new(0)),
            workers_failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records one emitted line
    pub fn record_line(&self) {
        self.lines_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records bytes consumed by a worker's reader
    pub fn record_bytes(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a finished worker
    pub fn record_worker(&self, success: bool) {
        if success {
            self.workers_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.workers_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Gets a snapshot of the counters
    pub fn get_stats(&self) -> ScanStats {
        ScanStats {
            lines_emitted: self.lines_emitted.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            workers_succeeded: self.workers_succeeded.load(Ordering::Relaxed),
            workers_failed: self.workers_failed.load(Ordering::Relaxed),
        }
    }

    /// Logs the counters for a run that took `elapsed`
    pub fn log_stats(&self, elapsed: Duration) {
        let stats = self.get_stats();
        info!(
            "Scan stats:\n\
             Lines emitted: {}\n\
             Bytes read: {}\n\
             Workers succeeded/failed: {}/{}\n\
             Elapsed: {}",
            stats.lines_emitted,
            stats.bytes_read,
            stats.workers_succeeded,
            stats.workers_failed,
            humantime::format_duration(truncate_to_millis(elapsed))
        );
    }
}

fn truncate_to_millis(elapsed: Duration) -> Duration {
    Duration::from_millis(elapsed.as_millis() as u64)
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`ScanMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub lines_emitted: u64,
    pub bytes_read: u64,
    pub workers_succeeded: u64,
    pub workers_failed: u64,
}
