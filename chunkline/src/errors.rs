//! Error types for chunkline.
//!
//! Errors fall into two groups. Run-level errors (bad configuration, a missing input file,
//! a worker pool that cannot be built, a broken output stream) abort the whole run and are
//! returned as `Err` from the coordinator. Worker-level errors (open, seek, read, encoding,
//! panics) are captured at the task boundary and stored in that worker's report, so a
//! failing worker never takes its siblings down with it:
//!
//! ```rust,ignore
//! let result = coordinator.run()?;          // run-level errors
//! for (worker_id, kind) in result.failed_workers() {
//!     eprintln!("worker {} failed: {:?}", worker_id, kind); // worker-level errors
//! }
//! ```
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that can occur while partitioning, scanning or aggregating a file
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Worker {worker_id} failed to open input: {source}")]
    OpenError {
        worker_id: usize,
        #[source]
        source: io::Error,
    },
    #[error("Worker {worker_id} failed to seek to offset {offset}: {source}")]
    SeekError {
        worker_id: usize,
        offset: u64,
        #[source]
        source: io::Error,
    },
    #[error("Worker {worker_id} failed to read at offset {offset}: {source}")]
    ReadError {
        worker_id: usize,
        offset: u64,
        #[source]
        source: io::Error,
    },
    #[error("Worker {worker_id} found invalid UTF-8 in line at offset {offset}: {source}")]
    EncodingError {
        worker_id: usize,
        offset: u64,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("Worker {worker_id} panicked")]
    WorkerPanicked { worker_id: usize },
    #[error("Failed to build worker pool: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Coarse classification of a [`ScanError`], used when reporting failed workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    InvalidArgument,
    Open,
    Seek,
    Read,
    Encoding,
    Panic,
    Runtime,
    Io,
}

impl ScanError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn open(worker_id: usize, source: io::Error) -> Self {
        Self::OpenError { worker_id, source }
    }

    pub fn seek(worker_id: usize, offset: u64, source: io::Error) -> Self {
        Self::SeekError {
            worker_id,
            offset,
            source,
        }
    }

    pub fn read(worker_id: usize, offset: u64, source: io::Error) -> Self {
        Self::ReadError {
            worker_id,
            offset,
            source,
        }
    }

    pub fn encoding(worker_id: usize, offset: u64, source: std::string::FromUtf8Error) -> Self {
        Self::EncodingError {
            worker_id,
            offset,
            source,
        }
    }

    /// Maps an error from opening the top-level input onto the path-carrying variants
    pub fn from_input_error(path: impl Into<PathBuf>, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::file_not_found(path),
            io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::IoError(err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigError(_) => ErrorKind::Config,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::FileNotFound(_) | Self::PermissionDenied(_) | Self::OpenError { .. } => {
                ErrorKind::Open
            }
            Self::SeekError { .. } => ErrorKind::Seek,
            Self::ReadError { .. } => ErrorKind::Read,
            Self::EncodingError { .. } => ErrorKind::Encoding,
            Self::WorkerPanicked { .. } => ErrorKind::Panic,
            Self::ThreadPoolError(_) => ErrorKind::Runtime,
            Self::IoError(_) => ErrorKind::Io,
        }
    }

    /// The worker an error belongs to, if it was raised inside a worker task
    pub fn worker_id(&self) -> Option<usize> {
        match self {
            Self::OpenError { worker_id, .. }
            | Self::SeekError { worker_id, .. }
            | Self::ReadError { worker_id, .. }
            | Self::EncodingError { worker_id, .. }
            | Self::WorkerPanicked { worker_id } => Some(*worker_id),
            _ => None,
        }
    }
}
