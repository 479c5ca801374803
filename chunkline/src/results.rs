//! Records and outcomes produced by a scan run.
//!
//! Everything here is plain owned data: workers move their [`LineRecord`]s and
//! [`WorkerReport`] into the coordinator's channel and never touch them again, and the
//! coordinator hands the assembled [`RunResult`] to the caller.
use std::time::Duration;

use crate::errors::{ErrorKind, ScanError};
use crate::scan::partition::ChunkRange;

/// One fully-resolved line of the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    /// The worker that owns and emitted the line
    pub worker_id: usize,
    /// Byte offset of the line's first byte in the input
    pub offset: u64,
    /// The line without its terminator
    pub text: String,
}

impl LineRecord {
    pub fn new(worker_id: usize, offset: u64, text: impl Into<String>) -> Self {
        Self {
            worker_id,
            offset,
            text: text.into(),
        }
    }
}

/// Outcome of a single worker
#[derive(Debug)]
pub struct WorkerReport {
    /// The range the worker was assigned
    pub range: ChunkRange,
    /// Number of records the worker emitted, including any before a failure
    pub lines_emitted: u64,
    /// Bytes consumed from the worker's reader, including skipped and overrun bytes
    pub bytes_read: u64,
    /// Set when the worker stopped because of an error
    pub error: Option<ScanError>,
}

impl WorkerReport {
    pub fn new(range: ChunkRange) -> Self {
        Self {
            range,
            lines_emitted: 0,
            bytes_read: 0,
            error: None,
        }
    }

    pub fn failed(range: ChunkRange, error: ScanError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(range)
        }
    }

    pub fn worker_id(&self) -> usize {
        self.range.worker_id
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate result of a run, assembled after every worker has reported
#[derive(Debug, Default)]
pub struct RunResult {
    /// Size of the input when the run started
    pub file_size: u64,
    /// Per-worker outcomes, ordered by worker id
    pub reports: Vec<WorkerReport>,
    /// Records collected by the run; empty when records were streamed to a sink
    pub records: Vec<LineRecord>,
    /// Wall-clock time from partitioning to the end of the barrier
    pub elapsed: Duration,
}

impl RunResult {
    /// Creates an empty result for an input of `file_size` bytes
    pub fn new(file_size: u64) -> Self {
        Self {
            file_size,
            ..Default::default()
        }
    }

    /// Adds a worker's report, keeping reports ordered by worker id
    pub fn add_report(&mut self, report: WorkerReport) {
        let index = self
            .reports
            .partition_point(|r| r.worker_id() < report.worker_id());
        self.reports.insert(index, report);
    }

    /// True when every worker finished without an error
    pub fn is_success(&self) -> bool {
        self.reports.iter().all(WorkerReport::is_success)
    }

    /// Ids and error kinds of the workers that failed
    pub fn failed_workers(&self) -> Vec<(usize, ErrorKind)> {
        self.reports
            .iter()
            .filter_map(|r| r.error.as_ref().map(|e| (r.worker_id(), e.kind())))
            .collect()
    }

    /// Errors of the failed workers, ordered by worker id
    pub fn errors(&self) -> impl Iterator<Item = &ScanError> {
        self.reports.iter().filter_map(|r| r.error.as_ref())
    }

    /// Total records emitted across all workers
    pub fn total_lines(&self) -> u64 {
        self.reports.iter().map(|r| r.lines_emitted).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn range(worker_id: usize, start: u64, end: u64) -> ChunkRange {
        ChunkRange {
            worker_id,
            start,
            end,
        }
    }

    #[test]
    fn test_reports_stay_ordered() {
        let mut result = RunResult::new(30);
        result.add_report(WorkerReport::new(range(2, 20, 30)));
        result.add_report(WorkerReport::new(range(0, 0, 10)));
        result.add_report(WorkerReport::new(range(1, 10, 20)));

        let ids: Vec<usize> = result.reports.iter().map(WorkerReport::worker_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(result.is_success());
    }

    #[test]
    fn test_failed_workers() {
        let mut result = RunResult::new(30);
        let mut ok = WorkerReport::new(range(0, 0, 15));
        ok.lines_emitted = 3;
        let mut partial = WorkerReport::failed(
            range(1, 15, 30),
            ScanError::read(1, 22, io::Error::new(io::ErrorKind::Other, "disk")),
        );
        partial.lines_emitted = 1;
        result.add_report(partial);
        result.add_report(ok);

        assert!(!result.is_success());
        assert_eq!(result.failed_workers(), vec![(1, ErrorKind::Read)]);
        assert_eq!(result.errors().count(), 1);
        assert_eq!(result.total_lines(), 4);
    }

    #[test]
    fn test_empty_run_is_success() {
        let result = RunResult::new(0);
        assert!(result.is_success());
        assert_eq!(result.total_lines(), 0);
        assert!(result.failed_workers().is_empty());
    }
}
