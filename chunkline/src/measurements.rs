//! Per-station temperature summaries.
//!
//! Input lines look like `Hamburg;12.0`: a station name, a semicolon and a temperature
//! between -99.9 and 99.9 with exactly one fractional digit. Temperatures are kept as
//! integer tenths of a degree so that aggregation is exact; only the mean is computed in
//! floating point, and it is rounded half-up to one decimal when displayed.
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::errors::ScanResult;
use crate::results::LineRecord;
use crate::sink::RecordSink;

/// Running min/max/sum/count for one station, in tenths of a degree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationStats {
    pub min: i64,
    pub max: i64,
    pub sum: i64,
    pub count: u64,
}

impl StationStats {
    pub fn new(tenths: i64) -> Self {
        Self {
            min: tenths,
            max: tenths,
            sum: tenths,
            count: 1,
        }
    }

    pub fn record(&mut self, tenths: i64) {
        self.min = self.min.min(tenths);
        self.max = self.max.max(tenths);
        self.sum += tenths;
        self.count += 1;
    }

    /// Mean in tenths, rounded half-up
    pub fn mean_tenths(&self) -> i64 {
        (self.sum as f64 / self.count as f64 + 0.5).floor() as i64
    }
}

impl fmt::Display for StationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            Tenths(self.min),
            Tenths(self.mean_tenths()),
            Tenths(self.max)
        )
    }
}

/// Formats integer tenths as a one-decimal number without a negative zero
struct Tenths(i64);

impl fmt::Display for Tenths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{}", sign, abs / 10, abs % 10)
    }
}

/// Parses `-12.3` style temperatures into tenths
fn parse_tenths(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, fraction) = digits.split_once('.')?;
    if whole.is_empty()
        || whole.len() > 2
        || fraction.len() != 1
        || !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let value = whole.parse::<i64>().ok()? * 10 + fraction.parse::<i64>().ok()?;
    Some(if negative { -value } else { value })
}

/// Splits a `<station>;<temperature>` line
pub fn parse_measurement(line: &str) -> Option<(&str, i64)> {
    let (station, temperature) = line.rsplit_once(';')?;
    if station.is_empty() {
        return None;
    }
    Some((station, parse_tenths(temperature)?))
}

/// Aggregates measurement lines into per-station statistics, ordered by station name
#[derive(Debug, Default)]
pub struct MeasurementSink {
    stations: BTreeMap<String, StationStats>,
    skipped: u64,
}

impl MeasurementSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stations(&self) -> &BTreeMap<String, StationStats> {
        &self.stations
    }

    /// Number of lines that were not valid measurements
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl RecordSink for MeasurementSink {
    fn accept(&mut self, record: LineRecord) -> ScanResult<()> {
        match parse_measurement(&record.text) {
            Some((station, tenths)) => match self.stations.get_mut(station) {
                Some(stats) => stats.record(tenths),
                None => {
                    self.stations
                        .insert(station.to_string(), StationStats::new(tenths));
                }
            },
            None => {
                self.skipped += 1;
                debug!(
                    "Skipping malformed measurement at offset {}: {:?}",
                    record.offset, record.text
                );
            }
        }
        Ok(())
    }
}

impl fmt::Display for MeasurementSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (station, stats)) in self.stations.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", station, stats)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_measurement() {
        assert_eq!(parse_measurement("Hamburg;12.0"), Some(("Hamburg", 120)));
        assert_eq!(parse_measurement("Oslo;-3.4"), Some(("Oslo", -34)));
        assert_eq!(parse_measurement("Lima;-99.9"), Some(("Lima", -999)));
        assert_eq!(parse_measurement("A;b;7.1"), Some(("A;b", 71)));
        assert_eq!(parse_measurement("Nowhere"), None);
        assert_eq!(parse_measurement(";1.0"), None);
        assert_eq!(parse_measurement("Rome;100.0"), None);
        assert_eq!(parse_measurement("Rome;1.25"), None);
        assert_eq!(parse_measurement("Rome;.5"), None);
        assert_eq!(parse_measurement("Rome;+1.5"), None);
    }

    #[test]
    fn test_stats_rounding() {
        let mut stats = StationStats::new(-12);
        stats.record(-13);
        // Mean of -1.2 and -1.3 is -1.25, rounded half-up to -1.2
        assert_eq!(stats.to_string(), "-1.3/-1.2/-1.2");

        let mut stats = StationStats::new(1);
        stats.record(-2);
        // Mean -0.05 rounds up to 0.0, never "-0.0"
        assert_eq!(stats.to_string(), "-0.2/0.0/0.1");
    }

    #[test]
    fn test_sink_summary() {
        let mut sink = MeasurementSink::new();
        let lines = [
            "Oslo;-3.0",
            "Hamburg;12.0",
            "garbage",
            "Oslo;5.0",
            "Hamburg;8.0",
            "Abha;30.1",
        ];
        for (i, line) in lines.iter().enumerate() {
            sink.accept(LineRecord::new(0, i as u64 * 10, *line)).unwrap();
        }

        assert_eq!(sink.skipped(), 1);
        assert_eq!(sink.stations().len(), 3);
        assert_eq!(sink.stations()["Oslo"].count, 2);
        assert_eq!(
            sink.to_string(),
            "{Abha=30.1/30.1/30.1, Hamburg=8.0/10.0/12.0, Oslo=-3.0/1.0/5.0}"
        );
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(MeasurementSink::new().to_string(), "{}");
    }
}
