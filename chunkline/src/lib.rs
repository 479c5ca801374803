pub mod config;
pub mod errors;
pub mod measurements;
pub mod metrics;
pub mod results;
pub mod scan;
pub mod sink;
pub mod source;

pub use config::{CliOverrides, EncodingMode, PartitionStrategy, ScanConfig};
pub use errors::{ErrorKind, ScanError, ScanResult};
pub use measurements::MeasurementSink;
pub use metrics::{ScanMetrics, ScanStats};
pub use results::{LineRecord, RunResult, WorkerReport};
pub use scan::{partition, run, ChunkRange, ChunkScanner, Coordinator};
pub use sink::{CollectSink, DiscardSink, RecordSink, WriterSink};
pub use source::{FileSource, MemorySource, ScanSource};
