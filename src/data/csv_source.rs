//! Candles from CSV files, optionally zstd-compressed
//!
//! One file per instrument and timeframe: `<dir>/<INSTRUMENT>_<tf>.csv` or
//! `<dir>/<INSTRUMENT>_<tf>.csv.zst`, header
//! `timestamp,open,high,low,close,volume`. The volume column may be empty or
//! missing.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{within, CandleSource, DataError};
use crate::trading_core::candles::sort_candles;
use crate::trading_core::{Candle, Timeframe};

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` or a bare date, all read as UTC
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(ts.and_utc());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Failed to parse timestamp: {}", raw))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid date: {}", raw))?;
    Ok(midnight.and_utc())
}

/// Parse candle rows from any CSV reader
pub fn read_candles<R: Read>(reader: R) -> Result<Vec<Candle>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut candles = Vec::new();
    for result in csv_reader.deserialize() {
        let row: CsvRow = result.with_context(|| "Failed to parse CSV row")?;
        candles.push(Candle {
            timestamp: parse_timestamp(&row.timestamp)?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    sort_candles(&mut candles);
    Ok(candles)
}

/// Read a `.csv` or `.csv.zst` file
pub fn read_candle_file(path: &Path) -> Result<Vec<Candle>> {
    let file = File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;
    if path.extension().is_some_and(|ext| ext == "zst") {
        let decoder = zstd::stream::Decoder::new(file)
            .with_context(|| format!("Failed to create zstd decoder for: {:?}", path))?;
        read_candles(BufReader::new(decoder))
    } else {
        read_candles(BufReader::new(file))
    }
}

#[derive(Debug, Clone)]
pub struct CsvCandleSource {
    data_dir: PathBuf,
}

impl CsvCandleSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Compressed file first, then plain CSV
    pub fn file_for(&self, instrument: &str, timeframe: Timeframe) -> Option<PathBuf> {
        let stem = format!("{}_{}", instrument.to_uppercase(), timeframe.code());
        [format!("{}.csv.zst", stem), format!("{}.csv", stem)]
            .into_iter()
            .map(|name| self.data_dir.join(name))
            .find(|path| path.exists())
    }
}

impl CandleSource for CsvCandleSource {
    fn fetch(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let unavailable = || DataError::Unavailable {
            instrument: instrument.to_string(),
            timeframe,
        };
        let path = self.file_for(instrument, timeframe).ok_or_else(unavailable)?;
        let candles = within(read_candle_file(&path)?, start, end);
        debug!("{:?}: {} {} candles in range", path, candles.len(), timeframe);
        if candles.is_empty() {
            return Err(unavailable().into());
        }
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    const CSV: &str = "timestamp,open,high,low,close,volume\n\
2026-01-12T01:00:00Z,4501.0,4506.5,4498.0,4504.0,\n\
2026-01-12 00:00:00,4500.0,4503.0,4497.5,4501.0,1250\n\
2026-01-12T02:00:00+00:00,4504.0,4510.0,4502.0,4508.5,900\n";

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 12, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_read_candles_sorts_and_keeps_missing_volume() {
        let candles = read_candles(CSV.as_bytes()).unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].timestamp, at(0));
        assert_eq!(candles[0].volume, Some(1250.0));
        assert_eq!(candles[1].volume, None);
        assert_eq!(candles[2].close, 4508.5);
    }

    #[test]
    fn test_volume_column_is_optional() {
        let csv = "timestamp,open,high,low,close\n2026-01-12,4500,4510,4490,4505\n";
        let candles = read_candles(csv.as_bytes()).unwrap();
        assert_eq!(candles[0].timestamp, at(0));
        assert_eq!(candles[0].volume, None);
    }

    #[test]
    fn test_bad_timestamp_is_error() {
        let csv = "timestamp,open,high,low,close\nyesterday,4500,4510,4490,4505\n";
        assert!(read_candles(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_fetch_plain_and_compressed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("XAUUSD_1h.csv"), CSV).unwrap();
        let compressed = zstd::encode_all(CSV.as_bytes(), 3).unwrap();
        let mut file = File::create(dir.path().join("XAUUSD_4h.csv.zst")).unwrap();
        file.write_all(&compressed).unwrap();

        let source = CsvCandleSource::new(dir.path());
        let h1 = source.fetch("xauusd", Timeframe::H1, at(1), at(2)).unwrap();
        assert_eq!(h1.len(), 2);
        let h4 = source.fetch("XAUUSD", Timeframe::H4, at(0), at(3)).unwrap();
        assert_eq!(h4.len(), 3);

        let err = source.fetch("XAUUSD", Timeframe::Daily, at(0), at(3)).unwrap_err();
        assert!(matches!(err.downcast_ref::<DataError>(), Some(DataError::Unavailable { .. })));
        assert!(source.fetch("XAUUSD", Timeframe::H1, at(5), at(6)).is_err());
    }
}
