//! Parallel line scanning over byte-range chunks.
//!
//! A run has three stages:
//!
//! 1. **Partitioning** ([`partition`]): the file is cut into one contiguous byte range per
//!    worker. The ranges know nothing about lines; a line may start in one range and end in
//!    the next.
//! 2. **Scanning** ([`ChunkScanner`]): every worker reads its own range through its own
//!    file handle. A worker owns exactly the lines whose first byte lies inside its range:
//!    - a worker that does not start at offset 0 first discards the partial line it lands in,
//!      because the previous worker owns it
//!    - the last line a worker owns may run past the end of its range; the worker reads it
//!      to completion
//! 3. **Coordination** ([`Coordinator`]): all workers are launched before any result is
//!    awaited, their records flow through one bounded channel to a single sink, and the run
//!    completes once every worker has reported.
//!
//! Together the skip and extend rules emit every line of the file exactly once, for any
//! number of workers.
//!
//! ```rust,no_run
//! use chunkline::scan::run;
//!
//! let result = run("measurements.txt", 4)?;
//! for record in &result.records {
//!     println!("{} {}", record.worker_id, record.text);
//! }
//! # Ok::<(), chunkline::ScanError>(())
//! ```
pub mod coordinator;
pub mod partition;
pub mod worker;

pub use coordinator::{run, Coordinator};
pub use partition::{align_to_lines, partition, ChunkRange};
pub use worker::{ChunkScanner, ScanOptions};
