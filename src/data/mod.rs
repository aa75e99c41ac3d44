//! Market data adapters
//!
//! Candle history comes from a [`CandleSource`]. The CSV source reads plain or
//! zstd-compressed files, the cache wraps any source with a staleness check,
//! and the snapshot loader assembles everything the report needs.

pub mod cache;
pub mod csv_source;
pub mod snapshot;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::trading_core::{Candle, Timeframe};

pub use cache::CachedCandleSource;
pub use csv_source::CsvCandleSource;
pub use snapshot::{load_snapshot, SnapshotFiles};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("no {timeframe} candles available for {instrument}")]
    Unavailable { instrument: String, timeframe: Timeframe },
}

/// Anything that can hand out historical candles
pub trait CandleSource: Send + Sync {
    /// Candles with `start <= timestamp <= end`, oldest first
    fn fetch(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;
}

impl<S: CandleSource + ?Sized> CandleSource for Arc<S> {
    fn fetch(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        (**self).fetch(instrument, timeframe, start, end)
    }
}

/// CSV files under `data_dir`, behind a cache when `cache_dir` is set
pub fn open_source(data_dir: Option<PathBuf>, cache_dir: Option<PathBuf>) -> Option<Arc<dyn CandleSource>> {
    let csv = CsvCandleSource::new(data_dir?);
    Some(match cache_dir {
        Some(dir) => Arc::new(CachedCandleSource::new(csv, dir)),
        None => Arc::new(csv),
    })
}

/// Keep the candles inside `[start, end]`
pub(crate) fn within(candles: Vec<Candle>, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Candle> {
    candles
        .into_iter()
        .filter(|c| c.timestamp >= start && c.timestamp <= end)
        .collect()
}
