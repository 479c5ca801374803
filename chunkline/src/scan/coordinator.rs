use crossbeam_channel::bounded;
use rayon::ThreadPoolBuilder;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::partition::{align_to_lines, partition, ChunkRange};
use super::worker::{run_worker, ScanOptions, WorkerMessage};
use crate::config::{PartitionStrategy, ScanConfig, DEFAULT_WORKER_COUNT};
use crate::errors::{ScanError, ScanResult};
use crate::metrics::ScanMetrics;
use crate::results::{RunResult, WorkerReport};
use crate::sink::{CollectSink, RecordSink};
use crate::source::{FileSource, ScanSource};

/// Runs one worker per chunk and gathers their output
#[derive(Debug, Clone)]
pub struct Coordinator {
    config: ScanConfig,
}

impl Coordinator {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scans the configured file and collects every record into the result
    pub fn run(&self) -> ScanResult<RunResult> {
        let mut sink = CollectSink::new();
        let mut result = self.run_with_sink(&mut sink)?;
        result.records = sink.into_records();
        Ok(result)
    }

    /// Scans the configured file, streaming records into `sink`
    pub fn run_with_sink(&self, sink: &mut dyn RecordSink) -> ScanResult<RunResult> {
        self.config.validate()?;
        let source = Arc::new(FileSource::new(&self.config.path)?);
        self.run_source(source, sink)
    }

    /// Scans `source`, streaming records into `sink`.
    ///
    /// Every worker is spawned before the coordinator starts waiting. The calling thread then
    /// drains the shared channel, forwarding records as they arrive, until each worker has
    /// sent its final report. Worker failures end up in the result; only configuration,
    /// pool and sink failures are returned as errors.
    pub fn run_source<S>(&self, source: Arc<S>, sink: &mut dyn RecordSink) -> ScanResult<RunResult>
    where
        S: ScanSource + 'static,
    {
        self.config.validate_tuning()?;
        let started = Instant::now();
        let worker_count = self.config.worker_count.get();
        let file_size = source.len();
        info!(
            "Scanning {} bytes with {} workers",
            file_size, worker_count
        );

        let mut ranges = partition(file_size, worker_count)?;
        if self.config.strategy == PartitionStrategy::LineAligned {
            ranges = align_to_lines(source.as_ref(), ranges)?;
        }
        for range in &ranges {
            debug!("Assigned {}", range);
        }

        let mut result = RunResult::new(file_size);
        if source.is_empty() {
            debug!("Empty input, nothing to scan");
            sink.finish()?;
            result.elapsed = started.elapsed();
            return Ok(result);
        }

        let metrics = ScanMetrics::new();

        // Empty ranges own no lines; their workers finish without touching the source
        let (scanned, idle): (Vec<ChunkRange>, Vec<ChunkRange>) =
            ranges.into_iter().partition(|range| !range.is_empty());
        for range in idle {
            metrics.record_worker(true);
            result.add_report(WorkerReport::new(range));
        }
        debug!(
            "{} of {} workers have an empty range",
            result.reports.len(),
            worker_count
        );

        let pool = ThreadPoolBuilder::new()
            .num_threads(pool_size(scanned.len()))
            .thread_name(|i| format!("chunkline-worker-{}", i))
            .build()?;
        let (sender, receiver) = bounded(self.config.channel_capacity);
        let options = ScanOptions::from(&self.config);

        // Launch every worker before waiting on any of them
        for range in scanned.iter().copied() {
            let source = Arc::clone(&source);
            let sender = sender.clone();
            let metrics = metrics.clone();
            pool.spawn(move || {
                let report = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_worker(source.as_ref(), range, &options, &sender, &metrics)
                }))
                .unwrap_or_else(|_| {
                    WorkerReport::failed(
                        range,
                        ScanError::WorkerPanicked {
                            worker_id: range.worker_id,
                        },
                    )
                });
                metrics.record_worker(report.is_success());
                let _ = sender.send(WorkerMessage::Done(report));
            });
        }
        drop(sender);

        // Barrier: one Done per worker
        let mut pending = scanned.len();
        let mut buffered = Vec::new();
        let mut sink_error = None;
        while pending > 0 {
            match receiver.recv() {
                Ok(WorkerMessage::Line(record)) => {
                    if self.config.ordered {
                        buffered.push(record);
                    } else if sink_error.is_none() {
                        // Keep draining after a sink failure so no worker blocks on send
                        if let Err(e) = sink.accept(record) {
                            sink_error = Some(e);
                        }
                    }
                }
                Ok(WorkerMessage::Done(report)) => {
                    pending -= 1;
                    if let Some(e) = &report.error {
                        warn!("Worker {} failed: {}", report.worker_id(), e);
                    }
                    result.add_report(report);
                }
                Err(_) => {
                    warn!(
                        "Worker channel closed with {} reports outstanding",
                        pending
                    );
                    break;
                }
            }
        }

        if let Some(e) = sink_error {
            return Err(e);
        }
        if self.config.ordered {
            buffered.sort_by_key(|record| record.offset);
            for record in buffered {
                sink.accept(record)?;
            }
        }
        sink.finish()?;

        result.elapsed = started.elapsed();
        metrics.log_stats(result.elapsed);
        info!(
            "Scan complete. {} lines from {} workers, {} failed",
            result.total_lines(),
            result.reports.len(),
            result.failed_workers().len()
        );

        Ok(result)
    }
}

/// Threads for `jobs` workers: one each, up to the machine's available parallelism.
/// Jobs beyond that queue on the pool and start as threads free up.
fn pool_size(jobs: usize) -> usize {
    let available = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(DEFAULT_WORKER_COUNT.get());
    jobs.min(available).max(1)
}

/// Scans `path` with `worker_count` workers and collects every record
pub fn run(path: impl AsRef<Path>, worker_count: usize) -> ScanResult<RunResult> {
    let worker_count = NonZeroUsize::new(worker_count)
        .ok_or_else(|| ScanError::invalid_argument("worker count must be at least 1"))?;
    Coordinator::new(ScanConfig::new(path.as_ref(), worker_count)).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::results::LineRecord;
    use crate::source::MemorySource;
    use std::io::{self, Cursor, Read, Seek, SeekFrom};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn config(worker_count: usize) -> ScanConfig {
        ScanConfig {
            worker_count: NonZeroUsize::new(worker_count).unwrap(),
            ..Default::default()
        }
    }

    fn eight_lines() -> String {
        (1..=8).map(|i| format!("line {:02} of 8\n", i)).collect()
    }

    fn collect(coordinator: &Coordinator, source: MemorySource) -> (RunResult, Vec<LineRecord>) {
        let mut sink = CollectSink::new();
        let result = coordinator
            .run_source(Arc::new(source), &mut sink)
            .unwrap();
        (result, sink.into_records())
    }

    #[test]
    fn test_eight_lines_four_workers() {
        let text = eight_lines();
        let coordinator = Coordinator::new(config(4));
        let (result, mut records) = collect(&coordinator, MemorySource::from(text.as_str()));

        assert!(result.is_success());
        assert_eq!(result.reports.len(), 4);
        assert_eq!(records.len(), 8);
        records.sort_by_key(|r| r.offset);
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, text.lines().collect::<Vec<_>>());
        // 13-byte lines over 26-byte chunks: two lines per worker
        for report in &result.reports {
            assert_eq!(report.lines_emitted, 2);
        }
    }

    #[test]
    fn test_empty_source() {
        let coordinator = Coordinator::new(config(4));
        let (result, records) = collect(&coordinator, MemorySource::from(""));
        assert!(result.is_success());
        assert!(result.reports.is_empty());
        assert!(records.is_empty());
    }

    #[test]
    fn test_ordered_output_matches_file_order() {
        let text: String = (0..500).map(|i| format!("{}\n", i)).collect();
        let coordinator = Coordinator::new(ScanConfig {
            ordered: true,
            ..config(7)
        });
        let (result, records) = collect(&coordinator, MemorySource::from(text.as_str()));

        assert!(result.is_success());
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, text.lines().collect::<Vec<_>>());
    }

    #[test]
    fn test_aligned_strategy_same_lines() {
        let text: String = (0..300)
            .map(|i| format!("{};{}\n", "s".repeat(i % 11), i))
            .collect();
        let fixed = Coordinator::new(ScanConfig {
            ordered: true,
            ..config(6)
        });
        let aligned = Coordinator::new(ScanConfig {
            ordered: true,
            strategy: PartitionStrategy::LineAligned,
            ..config(6)
        });

        let (_, fixed_records) = collect(&fixed, MemorySource::from(text.as_str()));
        let (_, aligned_records) = collect(&aligned, MemorySource::from(text.as_str()));
        let strip = |records: Vec<LineRecord>| -> Vec<(u64, String)> {
            records.into_iter().map(|r| (r.offset, r.text)).collect()
        };
        assert_eq!(strip(fixed_records), strip(aligned_records));
    }

    /// Source whose readers fail once they reach `fail_at`
    struct FlakySource {
        bytes: Arc<[u8]>,
        fail_at: u64,
        panic_instead: bool,
    }

    struct FlakyReader {
        inner: Cursor<Arc<[u8]>>,
        fail_at: u64,
        panic_instead: bool,
    }

    impl Read for FlakyReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let position = self.inner.position();
            if position >= self.fail_at {
                if self.panic_instead {
                    panic!("reader exploded at {}", position);
                }
                return Err(io::Error::new(io::ErrorKind::Other, "bad sector"));
            }
            let allowed = (self.fail_at - position).min(buf.len() as u64) as usize;
            self.inner.read(&mut buf[..allowed])
        }
    }

    impl Seek for FlakyReader {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl ScanSource for FlakySource {
        type Reader = FlakyReader;

        fn len(&self) -> u64 {
            self.bytes.len() as u64
        }

        fn open(&self) -> io::Result<FlakyReader> {
            Ok(FlakyReader {
                inner: Cursor::new(Arc::clone(&self.bytes)),
                fail_at: self.fail_at,
                panic_instead: self.panic_instead,
            })
        }
    }

    fn ten_byte_lines(count: usize) -> Arc<[u8]> {
        let text: String = (0..count).map(|i| format!("record-{:02}\n", i)).collect();
        Arc::from(text.into_bytes())
    }

    #[test]
    fn test_read_failure_is_isolated() {
        // 8 lines of 10 bytes, 4 workers of 20 bytes, reads fail from byte 60
        let source = FlakySource {
            bytes: ten_byte_lines(8),
            fail_at: 60,
            panic_instead: false,
        };
        let coordinator = Coordinator::new(config(4));
        let mut sink = CollectSink::new();
        let result = coordinator.run_source(Arc::new(source), &mut sink).unwrap();

        assert!(!result.is_success());
        assert_eq!(result.failed_workers(), vec![(3, ErrorKind::Read)]);
        assert_eq!(sink.records().len(), 6);
        assert!(sink.records().iter().all(|r| r.worker_id != 3));
    }

    #[test]
    fn test_partial_output_is_kept() {
        // Worker 1 owns records 03..=05 and fails while reading record 04
        let source = FlakySource {
            bytes: ten_byte_lines(6),
            fail_at: 45,
            panic_instead: false,
        };
        let coordinator = Coordinator::new(ScanConfig {
            buffer_capacity: 8,
            ..config(2)
        });
        let mut sink = CollectSink::new();
        let result = coordinator.run_source(Arc::new(source), &mut sink).unwrap();

        assert_eq!(result.failed_workers(), vec![(1, ErrorKind::Read)]);
        assert_eq!(result.reports[1].lines_emitted, 1);
        let worker_one: Vec<&str> = sink
            .records()
            .iter()
            .filter(|r| r.worker_id == 1)
            .map(|r| r.text.as_str())
            .collect();
        assert_eq!(worker_one, vec!["record-03"]);
    }

    #[test]
    fn test_panicking_worker_is_reported() {
        let source = FlakySource {
            bytes: ten_byte_lines(8),
            fail_at: 60,
            panic_instead: true,
        };
        let coordinator = Coordinator::new(config(4));
        let mut sink = CollectSink::new();
        let result = coordinator.run_source(Arc::new(source), &mut sink).unwrap();

        assert_eq!(result.failed_workers(), vec![(3, ErrorKind::Panic)]);
        assert_eq!(sink.records().len(), 6);
    }

    /// Source that counts how many readers are being opened at the same time
    struct ConcurrencyProbe {
        inner: MemorySource,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScanSource for ConcurrencyProbe {
        type Reader = <MemorySource as ScanSource>::Reader;

        fn len(&self) -> u64 {
            self.inner.len()
        }

        fn open(&self) -> io::Result<Self::Reader> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(150));
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.inner.open()
        }
    }

    #[test]
    fn test_workers_run_concurrently() {
        let text: String = (0..64).map(|i| format!("{:04}\n", i)).collect();
        let probe = Arc::new(ConcurrencyProbe {
            inner: MemorySource::from(text.as_str()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let coordinator = Coordinator::new(config(4));
        let mut sink = CollectSink::new();
        let result = coordinator
            .run_source(Arc::clone(&probe), &mut sink)
            .unwrap();

        assert!(result.is_success());
        assert_eq!(sink.records().len(), 64);
        assert_eq!(probe.peak.load(Ordering::SeqCst), pool_size(4));
    }

    #[test]
    fn test_pool_size_is_capped() {
        let available = thread::available_parallelism().unwrap().get();
        assert_eq!(pool_size(1), 1);
        assert_eq!(pool_size(available), available);
        assert_eq!(pool_size(available * 100), available);
        assert_eq!(pool_size(0), 1);
    }

    #[test]
    fn test_many_more_workers_than_bytes() {
        let coordinator = Coordinator::new(config(5000));
        let started = std::time::Instant::now();
        let (result, records) = collect(&coordinator, MemorySource::from("a\nb\nc\n"));

        assert!(result.is_success());
        assert_eq!(result.reports.len(), 5000);
        assert!(result.reports[..4999].iter().all(|r| r.lines_emitted == 0));
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert!(records.iter().all(|r| r.worker_id == 4999));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    /// Source whose `fail_on`-th open fails
    struct OpenFailureSource {
        inner: MemorySource,
        opens: AtomicUsize,
        fail_on: usize,
    }

    impl ScanSource for OpenFailureSource {
        type Reader = <MemorySource as ScanSource>::Reader;

        fn len(&self) -> u64 {
            self.inner.len()
        }

        fn open(&self) -> io::Result<Self::Reader> {
            if self.opens.fetch_add(1, Ordering::SeqCst) == self.fail_on {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
            }
            self.inner.open()
        }
    }

    #[test]
    fn test_open_failure_is_isolated() {
        let source = OpenFailureSource {
            inner: MemorySource::new(ten_byte_lines(8)),
            opens: AtomicUsize::new(0),
            fail_on: 2,
        };
        let coordinator = Coordinator::new(config(4));
        let mut sink = CollectSink::new();
        let result = coordinator.run_source(Arc::new(source), &mut sink).unwrap();

        // Which worker opens third depends on scheduling; exactly one fails
        let failed = result.failed_workers();
        assert_eq!(failed.len(), 1);
        let (failed_id, kind) = failed[0];
        assert_eq!(kind, ErrorKind::Open);
        assert_eq!(result.reports[failed_id].lines_emitted, 0);

        // 20-byte chunks of 10-byte lines: the other three workers emit two lines each
        assert_eq!(sink.records().len(), 6);
        assert!(sink.records().iter().all(|r| r.worker_id != failed_id));
    }

    struct FailingSink {
        accepted: usize,
    }

    impl RecordSink for FailingSink {
        fn accept(&mut self, _record: LineRecord) -> ScanResult<()> {
            self.accepted += 1;
            if self.accepted > 3 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed").into());
            }
            Ok(())
        }
    }

    #[test]
    fn test_sink_failure_does_not_block_workers() {
        let text: String = (0..10_000).map(|i| format!("{}\n", i)).collect();
        let coordinator = Coordinator::new(ScanConfig {
            channel_capacity: 2,
            ..config(3)
        });
        let mut sink = FailingSink { accepted: 0 };
        let err = coordinator
            .run_source(Arc::new(MemorySource::from(text)), &mut sink)
            .unwrap_err();

        assert!(matches!(err, ScanError::IoError(_)));
        assert_eq!(sink.accepted, 4);
    }

    #[test]
    fn test_run_rejects_zero_workers() {
        let err = run("does-not-matter.txt", 0).unwrap_err();
        assert!(matches!(err, ScanError::InvalidArgument(_)));
    }

    #[test]
    fn test_missing_path_is_config_error() {
        let err = Coordinator::new(ScanConfig::default()).run().unwrap_err();
        assert!(matches!(err, ScanError::ConfigError(_)));
    }
}
