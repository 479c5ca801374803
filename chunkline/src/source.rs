//! Immutable, re-openable inputs.
//!
//! A source is shared read-only by every worker of a run. Workers never share a cursor:
//! each calls [`ScanSource::open`] to get its own positioned reader, so seeking in one
//! worker cannot disturb another.
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{ScanError, ScanResult};

/// A byte source of known, fixed length that can be opened any number of times
pub trait ScanSource: Send + Sync {
    type Reader: Read + Seek;

    /// Total length in bytes, fixed for the lifetime of the source
    fn len(&self) -> u64;

    /// Opens a fresh reader positioned at the start of the source
    fn open(&self) -> io::Result<Self::Reader>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A file on disk, sized once at construction
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    /// Queries the size of `path`; fails if it is missing or not a regular file
    pub fn new(path: impl AsRef<Path>) -> ScanResult<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path).map_err(|e| ScanError::from_input_error(path, e))?;
        if !metadata.is_file() {
            return Err(ScanError::config_error(format!(
                "Not a regular file: {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            len: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScanSource for FileSource {
    type Reader = File;

    fn len(&self) -> u64 {
        self.len
    }

    fn open(&self) -> io::Result<File> {
        File::open(&self.path)
    }
}

/// An in-memory buffer, cheap to open from many workers
#[derive(Debug, Clone)]
pub struct MemorySource {
    bytes: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl From<&str> for MemorySource {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes())
    }
}

impl From<String> for MemorySource {
    fn from(text: String) -> Self {
        Self::new(text.into_bytes())
    }
}

impl ScanSource for MemorySource {
    type Reader = Cursor<Arc<[u8]>>;

    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn open(&self) -> io::Result<Self::Reader> {
        Ok(Cursor::new(Arc::clone(&self.bytes)))
    }
}
