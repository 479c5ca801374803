use config::{Config as ConfigBuilder, ConfigError, File};
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::{ScanError, ScanResult};

pub const DEFAULT_WORKER_COUNT: NonZeroUsize = match NonZeroUsize::new(4) {
    Some(n) => n,
    None => unreachable!(),
};
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// How lines that are not valid UTF-8 are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Stop the worker with an encoding error
    #[default]
    FailFast,
    /// Replace invalid sequences with U+FFFD and keep going
    Lossy,
}

/// How chunk boundaries are placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStrategy {
    /// Split the file into equal byte ranges; workers reconcile straddling lines
    #[default]
    Fixed,
    /// Move every internal boundary forward to the next line start before scanning
    #[serde(rename = "aligned")]
    LineAligned,
}

/// Configuration for a scan run.
///
/// # Configuration Locations
///
/// Values are merged from, in order of precedence (last wins):
/// 1. Global `$HOME/.config/chunkline/config.yaml`
/// 2. Local `.chunkline.yaml` in the current directory
/// 3. Custom config file specified via `--config`
///
/// Command-line arguments are applied on top with [`ScanConfig::merge_with_cli`].
///
/// # Configuration Format
///
/// ```yaml
/// # Number of workers (one chunk per worker)
/// worker_count: 8
///
/// # fixed | aligned
/// strategy: "aligned"
///
/// # failfast | lossy
/// encoding_mode: "lossy"
///
/// # Print records in file order once all workers finish
/// ordered: true
///
/// # Text between the worker id and the line
/// separator: "\t"
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// File to scan
    pub path: PathBuf,

    /// Number of workers, and therefore chunks
    pub worker_count: NonZeroUsize,

    /// Chunk boundary placement
    pub strategy: PartitionStrategy,

    /// Handling of invalid UTF-8
    pub encoding_mode: EncodingMode,

    /// Buffer records and emit them sorted by byte offset after all workers finish
    pub ordered: bool,

    /// Separator written between the worker id and the line text
    pub separator: String,

    /// Read buffer size per worker, in bytes
    pub buffer_capacity: usize,

    /// Bound of the channel carrying records from workers to the output sink
    pub channel_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Values given on the command line. `None` keeps the configured value, and `ordered`
/// can only be switched on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub path: Option<PathBuf>,
    pub worker_count: Option<NonZeroUsize>,
    pub strategy: Option<PartitionStrategy>,
    pub encoding_mode: Option<EncodingMode>,
    pub ordered: bool,
    pub separator: Option<String>,
    pub log_level: Option<String>,
}

fn default_separator() -> String {
    " ".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            worker_count: DEFAULT_WORKER_COUNT,
            strategy: PartitionStrategy::default(),
            encoding_mode: EncodingMode::default(),
            ordered: false,
            separator: default_separator(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            log_level: default_log_level(),
        }
    }
}

impl ScanConfig {
    /// Creates a configuration for scanning `path` with `worker_count` workers
    pub fn new(path: impl Into<PathBuf>, worker_count: NonZeroUsize) -> Self {
        Self {
            path: path.into(),
            worker_count,
            ..Default::default()
        }
    }

    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus a specific file.
    ///
    /// The specific file must exist; the default locations are optional.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let default_files = [
            dirs::config_dir().map(|p| p.join("chunkline/config.yaml")),
            Some(PathBuf::from(".chunkline.yaml")),
        ];

        for path in default_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder.build()?.try_deserialize()
    }

    /// Applies command-line values on top of configuration file values
    pub fn merge_with_cli(mut self, cli: CliOverrides) -> Self {
        if let Some(path) = cli.path {
            self.path = path;
        }
        if let Some(worker_count) = cli.worker_count {
            self.worker_count = worker_count;
        }
        if let Some(strategy) = cli.strategy {
            self.strategy = strategy;
        }
        if let Some(encoding_mode) = cli.encoding_mode {
            self.encoding_mode = encoding_mode;
        }
        if cli.ordered {
            self.ordered = true;
        }
        if let Some(separator) = cli.separator {
            self.separator = separator;
        }
        if let Some(log_level) = cli.log_level {
            self.log_level = log_level;
        }
        self
    }

    /// Checks the values a run over `path` cannot start without
    pub fn validate(&self) -> ScanResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(ScanError::config_error("No input file given"));
        }
        self.validate_tuning()
    }

    /// Checks everything except the input path
    pub fn validate_tuning(&self) -> ScanResult<()> {
        if self.buffer_capacity == 0 {
            return Err(ScanError::config_error("buffer_capacity must be at least 1"));
        }
        if self.channel_capacity == 0 {
            return Err(ScanError::config_error(
                "channel_capacity must be at least 1",
            ));
        }
        if self.separator.contains('\n') {
            return Err(ScanError::config_error(
                "separator must not contain a newline",
            ));
        }
        Ok(())
    }
}
