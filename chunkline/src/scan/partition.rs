use std::fmt;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use tracing::debug;

use crate::errors::{ScanError, ScanResult};
use crate::source::ScanSource;

/// A half-open byte range `[start, end)` of the input, assigned to one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    pub worker_id: usize,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// True for the chunk that starts at the beginning of the input
    pub fn is_first(&self) -> bool {
        self.start == 0
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.start <= offset && offset < self.end
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "worker {} [{}, {})",
            self.worker_id, self.start, self.end
        )
    }
}

/// Splits `file_size` bytes into `worker_count` contiguous ranges.
///
/// Every range but the last has `file_size / worker_count` bytes; the last one absorbs the
/// remainder. Ranges are not line-aligned: workers settle straddling lines themselves.
/// An empty input yields no ranges.
pub fn partition(file_size: u64, worker_count: usize) -> ScanResult<Vec<ChunkRange>> {
    if worker_count == 0 {
        return Err(ScanError::invalid_argument(
            "worker count must be at least 1",
        ));
    }
    if file_size == 0 {
        return Ok(Vec::new());
    }

    let chunk_size = file_size / worker_count as u64;
    let ranges = (0..worker_count)
        .map(|worker_id| {
            let start = worker_id as u64 * chunk_size;
            let end = if worker_id == worker_count - 1 {
                file_size
            } else {
                start + chunk_size
            };
            ChunkRange {
                worker_id,
                start,
                end,
            }
        })
        .collect();

    Ok(ranges)
}

/// Moves every internal boundary of `ranges` forward to the first line start at or after it.
///
/// `ranges` must be a partition of `source` as produced by [`partition`]. A boundary with no
/// line start after it moves to the end of the input, leaving the following ranges empty.
pub fn align_to_lines<S: ScanSource + ?Sized>(
    source: &S,
    ranges: Vec<ChunkRange>,
) -> ScanResult<Vec<ChunkRange>> {
    if ranges.len() < 2 {
        return Ok(ranges);
    }

    let file_size = source.len();
    let mut reader = BufReader::new(source.open()?);
    let mut line = Vec::new();

    let mut boundaries = Vec::with_capacity(ranges.len() + 1);
    boundaries.push(0);
    let mut previous = 0;
    for range in &ranges[1..] {
        let nominal = range.start.max(previous);
        let aligned = if nominal == 0 || nominal >= file_size {
            nominal.min(file_size)
        } else {
            // The byte before the boundary tells us whether a line starts right at it
            reader.seek(SeekFrom::Start(nominal - 1))?;
            line.clear();
            let consumed = reader.read_until(b'\n', &mut line)? as u64;
            if line.last() == Some(&b'\n') {
                nominal - 1 + consumed
            } else {
                file_size
            }
        };
        boundaries.push(aligned);
        previous = aligned;
    }
    boundaries.push(file_size);

    let aligned: Vec<ChunkRange> = ranges
        .iter()
        .zip(boundaries.windows(2))
        .map(|(range, bounds)| ChunkRange {
            worker_id: range.worker_id,
            start: bounds[0],
            end: bounds[1],
        })
        .collect();

    debug!("Aligned {} chunk boundaries to line starts", aligned.len() - 1);
    Ok(aligned)
}
