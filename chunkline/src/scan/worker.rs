use crossbeam_channel::Sender;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use tracing::{debug, trace, warn};

use super::partition::ChunkRange;
use crate::config::{EncodingMode, ScanConfig, DEFAULT_BUFFER_CAPACITY};
use crate::errors::{ScanError, ScanResult};
use crate::metrics::ScanMetrics;
use crate::results::{LineRecord, WorkerReport};
use crate::source::ScanSource;

/// Per-worker reading options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub buffer_capacity: usize,
    pub encoding_mode: EncodingMode,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            encoding_mode: EncodingMode::default(),
        }
    }
}

impl From<&ScanConfig> for ScanOptions {
    fn from(config: &ScanConfig) -> Self {
        Self {
            buffer_capacity: config.buffer_capacity,
            encoding_mode: config.encoding_mode,
        }
    }
}

/// Decodes one line according to the encoding mode
fn decode_line(
    bytes: Vec<u8>,
    worker_id: usize,
    offset: u64,
    encoding_mode: EncodingMode,
) -> ScanResult<String> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => match encoding_mode {
            EncodingMode::FailFast => Err(ScanError::encoding(worker_id, offset, err)),
            EncodingMode::Lossy => {
                warn!(
                    "Invalid UTF-8 replaced in line at offset {} (worker {})",
                    offset, worker_id
                );
                Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
            }
        },
    }
}

/// Strips a trailing `\n` or `\r\n`
fn trim_terminator(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}

/// Scans the lines owned by one chunk.
///
/// A chunk owns exactly the lines whose first byte lies inside its range:
/// - a line that began before `start` belongs to an earlier chunk and is skipped;
/// - a line that begins before `end` is read to its terminator, even past `end`.
///
/// The scanner is a lazy, finite iterator. It stops for good after the end of its range,
/// the end of input, or the first error.
#[derive(Debug)]
pub struct ChunkScanner<R> {
    reader: BufReader<R>,
    range: ChunkRange,
    position: u64,
    origin: u64,
    encoding_mode: EncodingMode,
    finished: bool,
}

impl<R: Read + Seek> ChunkScanner<R> {
    /// Opens an independent reader on `source` and positions it at the first owned line
    pub fn open<S>(source: &S, range: ChunkRange, options: &ScanOptions) -> ScanResult<Self>
    where
        S: ScanSource<Reader = R> + ?Sized,
    {
        let inner = source
            .open()
            .map_err(|e| ScanError::open(range.worker_id, e))?;
        Self::new(inner, range, options)
    }

    /// Wraps an already-open reader; it is repositioned, so its current offset does not matter
    pub fn new(inner: R, range: ChunkRange, options: &ScanOptions) -> ScanResult<Self> {
        let mut reader = BufReader::with_capacity(options.buffer_capacity.max(1), inner);

        // Starting one byte early lets the skip below consume just the previous
        // terminator when a line begins exactly at `start`.
        let origin = if range.is_first() { 0 } else { range.start - 1 };
        reader
            .seek(SeekFrom::Start(origin))
            .map_err(|e| ScanError::seek(range.worker_id, origin, e))?;
        trace!("Worker {} positioned at offset {}", range.worker_id, origin);

        let mut scanner = Self {
            reader,
            range,
            position: origin,
            origin,
            encoding_mode: options.encoding_mode,
            finished: range.is_empty(),
        };

        if !scanner.finished && !range.is_first() {
            scanner.skip_partial_line()?;
        }

        Ok(scanner)
    }

    /// Discards bytes through the next line terminator
    fn skip_partial_line(&mut self) -> ScanResult<()> {
        let mut discarded = Vec::new();
        let skipped = self
            .reader
            .read_until(b'\n', &mut discarded)
            .map_err(|e| ScanError::read(self.range.worker_id, self.position, e))?;
        self.position += skipped as u64;
        trace!(
            "Worker {} skipped {} bytes of a line owned by an earlier chunk",
            self.range.worker_id,
            skipped
        );
        Ok(())
    }

    pub fn range(&self) -> ChunkRange {
        self.range
    }

    /// Offset of the next unread byte
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes consumed so far, including the skipped partial line
    pub fn bytes_read(&self) -> u64 {
        self.position - self.origin
    }
}

impl<R: Read + Seek> Iterator for ChunkScanner<R> {
    type Item = ScanResult<LineRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.position >= self.range.end {
            self.finished = true;
            return None;
        }

        let worker_id = self.range.worker_id;
        let offset = self.position;
        let mut line = Vec::new();
        match self.reader.read_until(b'\n', &mut line) {
            Ok(0) => {
                // End of input inside the range: only the last chunk gets here
                self.finished = true;
                None
            }
            Ok(read) => {
                self.position += read as u64;
                trim_terminator(&mut line);
                let decoded = decode_line(line, worker_id, offset, self.encoding_mode);
                if decoded.is_err() {
                    self.finished = true;
                }
                Some(decoded.map(|text| LineRecord::new(worker_id, offset, text)))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(ScanError::read(worker_id, offset, e)))
            }
        }
    }
}

impl<R: Read + Seek> std::iter::FusedIterator for ChunkScanner<R> {}

/// Messages sent from worker tasks to the coordinator
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Line(LineRecord),
    Done(WorkerReport),
}

/// Runs one worker to completion, streaming its records into `sender`.
///
/// Errors end the worker and are returned in its report; records sent before the error
/// stay sent.
pub(crate) fn run_worker<S: ScanSource + ?Sized>(
    source: &S,
    range: ChunkRange,
    options: &ScanOptions,
    sender: &Sender<WorkerMessage>,
    metrics: &ScanMetrics,
) -> WorkerReport {
    let mut scanner = match ChunkScanner::open(source, range, options) {
        Ok(scanner) => scanner,
        Err(e) => return WorkerReport::failed(range, e),
    };

    let mut report = WorkerReport::new(range);
    for item in scanner.by_ref() {
        match item {
            Ok(record) => {
                report.lines_emitted += 1;
                metrics.record_line();
                if sender.send(WorkerMessage::Line(record)).is_err() {
                    // Coordinator is gone; nobody is listening for the rest
                    break;
                }
            }
            Err(e) => {
                report.error = Some(e);
                break;
            }
        }
    }
    report.bytes_read = scanner.bytes_read();
    metrics.record_bytes(report.bytes_read);

    debug!(
        "Worker {} finished {}: {} lines, {} bytes",
        range.worker_id,
        range,
        report.lines_emitted,
        report.bytes_read
    );
    report
}
