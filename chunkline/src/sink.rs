//! Consumers of the records a run produces.
//!
//! The coordinator drains a single channel and feeds every record to one sink on the
//! calling thread, so sinks never need to be thread-safe and output framing stays intact
//! however the workers interleave.
use std::io::{BufWriter, Write};

use crate::errors::ScanResult;
use crate::results::LineRecord;

/// Receives records from the coordinator, one at a time
pub trait RecordSink {
    fn accept(&mut self, record: LineRecord) -> ScanResult<()>;

    /// Called once after the last record of a run
    fn finish(&mut self) -> ScanResult<()> {
        Ok(())
    }
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct CollectSink {
    records: Vec<LineRecord>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[LineRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<LineRecord> {
        self.records
    }
}

impl RecordSink for CollectSink {
    fn accept(&mut self, record: LineRecord) -> ScanResult<()> {
        self.records.push(record);
        Ok(())
    }
}

/// Drops every record; useful when only the run's counts matter
#[derive(Debug, Default)]
pub struct DiscardSink;

impl RecordSink for DiscardSink {
    fn accept(&mut self, _record: LineRecord) -> ScanResult<()> {
        Ok(())
    }
}

/// Writes `<worker_id><separator><text>` lines to a writer
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: BufWriter<W>,
    separator: String,
    written: u64,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W, separator: impl Into<String>) -> Self {
        Self {
            writer: BufWriter::new(writer),
            separator: separator.into(),
            written: 0,
        }
    }

    /// Number of records written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes and returns the underlying writer
    pub fn into_inner(self) -> ScanResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| e.into_error().into())
    }
}

impl<W: Write> RecordSink for WriterSink<W> {
    fn accept(&mut self, record: LineRecord) -> ScanResult<()> {
        writeln!(
            self.writer,
            "{}{}{}",
            record.worker_id, self.separator, record.text
        )?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> ScanResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}
