use anyhow::{bail, Context, Result};
use chunkline::{
    config::{CliOverrides, EncodingMode, PartitionStrategy, ScanConfig},
    Coordinator, DiscardSink, MeasurementSink, RecordSink, RunResult, WriterSink,
};
use clap::Parser;
use colored::Colorize;
use std::{io, num::NonZeroUsize, path::PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Scan a file's lines with parallel chunk workers", long_about = None)]
struct Cli {
    /// File to scan
    file: PathBuf,

    /// Number of workers (one chunk per worker)
    #[arg(short = 'j', long)]
    workers: Option<NonZeroUsize>,

    /// Separator between the worker id and the line
    #[arg(short = 's', long)]
    separator: Option<String>,

    /// Print lines in file order once all workers finish
    #[arg(long)]
    ordered: bool,

    /// How chunk boundaries are placed (fixed|aligned)
    #[arg(long)]
    strategy: Option<String>,

    /// How to handle invalid UTF-8 sequences (failfast|lossy)
    #[arg(long)]
    encoding: Option<String>,

    /// Print per-station min/mean/max instead of lines
    #[arg(long, conflicts_with = "stats")]
    measurements: bool,

    /// Show only per-worker statistics, not lines
    #[arg(long)]
    stats: bool,

    /// YAML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> Result<CliOverrides> {
        let strategy = match self.strategy.as_deref().map(str::to_lowercase).as_deref() {
            None => None,
            Some("fixed") => Some(PartitionStrategy::Fixed),
            Some("aligned") => Some(PartitionStrategy::LineAligned),
            Some(other) => bail!("Unknown strategy '{}' (expected fixed or aligned)", other),
        };

        let encoding_mode = match self.encoding.as_deref().map(str::to_lowercase).as_deref() {
            None => None,
            Some("failfast") => Some(EncodingMode::FailFast),
            Some("lossy") => Some(EncodingMode::Lossy),
            Some(other) => bail!("Unknown encoding '{}' (expected failfast or lossy)", other),
        };

        Ok(CliOverrides {
            path: Some(self.file.clone()),
            worker_count: self.workers,
            strategy,
            encoding_mode,
            ordered: self.ordered,
            separator: self.separator.clone(),
            log_level: self.log_level.clone(),
        })
    }
}

fn main() -> Result<()> {
    run()
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let file_config = ScanConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let config = file_config.merge_with_cli(cli.overrides()?);

    init_logging(&config.log_level);
    debug!("Effective configuration: {:?}", config);

    let coordinator = Coordinator::new(config);
    let result = if cli.measurements {
        let mut sink = MeasurementSink::new();
        let result = run_with(&coordinator, &mut sink)?;
        println!("{}", sink);
        if sink.skipped() > 0 {
            eprintln!(
                "{}",
                format!("Skipped {} malformed lines", sink.skipped()).yellow()
            );
        }
        result
    } else if cli.stats {
        let result = run_with(&coordinator, &mut DiscardSink)?;
        print_stats(&result);
        result
    } else {
        let separator = coordinator.config().separator.clone();
        let mut sink = WriterSink::new(io::stdout().lock(), separator);
        run_with(&coordinator, &mut sink)?
    };

    report_failures(&result)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_with(coordinator: &Coordinator, sink: &mut dyn RecordSink) -> Result<RunResult> {
    coordinator
        .run_with_sink(sink)
        .with_context(|| format!("Failed to scan {}", coordinator.config().path.display()))
}

fn print_stats(result: &RunResult) {
    for report in &result.reports {
        let status = if report.is_success() {
            "ok".green()
        } else {
            "failed".red()
        };
        println!(
            "{}: {} lines, {} bytes read [{}]",
            report.range.to_string().blue(),
            report.lines_emitted,
            report.bytes_read,
            status
        );
    }

    println!(
        "\nScanned {} lines from {} bytes with {} workers in {:.2?}",
        result.total_lines(),
        result.file_size,
        result.reports.len(),
        result.elapsed
    );
}

fn report_failures(result: &RunResult) -> Result<()> {
    if result.is_success() {
        return Ok(());
    }

    for error in result.errors() {
        eprintln!("{}", error.to_string().red());
    }
    bail!(
        "{} of {} workers failed",
        result.failed_workers().len(),
        result.reports.len()
    )
}
