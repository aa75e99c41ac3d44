//! Candle cache in front of a slower source
//!
//! One zstd-compressed JSON file per instrument and timeframe
//! (`<dir>/<INSTRUMENT>_<tf>.json.zst`). The inner source is only asked when
//! the newest cached candle is older than the timeframe's staleness
//! threshold. If that refresh fails, the cached candles are served. A file
//! never holds more than the timeframe's history window.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{within, CandleSource};
use crate::trading_core::{Candle, Timeframe};

pub struct CachedCandleSource<S> {
    inner: S,
    cache_dir: PathBuf,
}

impl<S: CandleSource> CachedCandleSource<S> {
    pub fn new(inner: S, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            cache_dir: cache_dir.into(),
        }
    }

    fn cache_path(&self, instrument: &str, timeframe: Timeframe) -> PathBuf {
        self.cache_dir
            .join(format!("{}_{}.json.zst", instrument.to_uppercase(), timeframe.code()))
    }

    /// Cached candles, empty when there is no cache file yet
    pub fn load(&self, instrument: &str, timeframe: Timeframe) -> Result<Vec<Candle>> {
        let path = self.cache_path(instrument, timeframe);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_cache(&path)
    }

    fn save(&self, instrument: &str, timeframe: Timeframe, candles: &[Candle]) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("Failed to create cache directory: {:?}", self.cache_dir))?;
        let path = self.cache_path(instrument, timeframe);
        let json = serde_json::to_vec(candles)?;
        let compressed = zstd::encode_all(&json[..], 3)?;
        std::fs::write(&path, compressed).with_context(|| format!("Failed to write cache: {:?}", path))?;
        Ok(())
    }

    /// Same as [`CandleSource::fetch`] with an explicit clock
    pub fn fetch_at(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let cached = self.load(instrument, timeframe).unwrap_or_else(|e| {
            warn!("Ignoring unreadable {} {} cache: {:#}", instrument, timeframe, e);
            Vec::new()
        });

        let fresh = cached
            .last()
            .is_some_and(|c| now - c.timestamp <= timeframe.staleness_threshold());
        if fresh {
            debug!("{} {} served from cache ({} candles)", instrument, timeframe, cached.len());
            return Ok(within(cached, start, end));
        }

        match self.inner.fetch(instrument, timeframe, start, end) {
            Ok(fetched) => {
                let merged = retain_history(merge(cached, fetched), timeframe);
                if let Err(e) = self.save(instrument, timeframe, &merged) {
                    warn!("Failed to update {} {} cache: {:#}", instrument, timeframe, e);
                }
                info!("{} {} refreshed, {} candles cached", instrument, timeframe, merged.len());
                Ok(within(merged, start, end))
            }
            Err(e) if !cached.is_empty() => {
                warn!("{} {} refresh failed, using stale cache: {:#}", instrument, timeframe, e);
                Ok(within(cached, start, end))
            }
            Err(e) => Err(e),
        }
    }
}

impl<S: CandleSource> CandleSource for CachedCandleSource<S> {
    fn fetch(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        self.fetch_at(instrument, timeframe, start, end, Utc::now())
    }
}

fn read_cache(path: &Path) -> Result<Vec<Candle>> {
    let compressed = std::fs::read(path).with_context(|| format!("Failed to read cache: {:?}", path))?;
    let json = zstd::decode_all(&compressed[..])?;
    let candles = serde_json::from_slice(&json).with_context(|| format!("Invalid cache: {:?}", path))?;
    Ok(candles)
}

/// Union by timestamp; fetched candles replace cached ones
fn merge(cached: Vec<Candle>, fetched: Vec<Candle>) -> Vec<Candle> {
    let mut by_time: BTreeMap<DateTime<Utc>, Candle> = BTreeMap::new();
    for candle in cached.into_iter().chain(fetched) {
        by_time.insert(candle.timestamp, candle);
    }
    by_time.into_values().collect()
}

/// Drop candles older than the history window before the newest one
fn retain_history(mut candles: Vec<Candle>, timeframe: Timeframe) -> Vec<Candle> {
    if let Some(newest) = candles.last().map(|c| c.timestamp) {
        let cutoff = newest - timeframe.history_window();
        candles.retain(|c| c.timestamp >= cutoff);
    }
    candles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataError;
    use crate::trading_core::candles::test_support::{base_time, candle};
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a fixed series, or fails when empty
    struct StubSource {
        candles: Vec<Candle>,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn new(candles: Vec<Candle>) -> Self {
            Self {
                candles,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl CandleSource for StubSource {
        fn fetch(
            &self,
            instrument: &str,
            timeframe: Timeframe,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Candle>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.candles.is_empty() {
                return Err(DataError::Unavailable {
                    instrument: instrument.to_string(),
                    timeframe,
                }
                .into());
            }
            Ok(within(self.candles.clone(), start, end))
        }
    }

    fn hours(n: i64) -> Vec<Candle> {
        (0..n).map(|h| candle(h, 4500.0, 4505.0, 4495.0, 4501.0)).collect()
    }

    #[test]
    fn test_fresh_cache_skips_inner_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = CachedCandleSource::new(StubSource::new(hours(5)), dir.path());
        let (start, end) = (base_time() - Duration::days(1), base_time() + Duration::days(1));
        let now = base_time() + Duration::hours(5);

        assert_eq!(source.fetch_at("XAUUSD", Timeframe::H1, start, end, now).unwrap().len(), 5);
        assert_eq!(source.inner.calls.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("XAUUSD_1h.json.zst").exists());

        // newest candle is 1h old, under the 2h threshold
        assert_eq!(source.fetch_at("XAUUSD", Timeframe::H1, start, end, now).unwrap().len(), 5);
        assert_eq!(source.inner.calls.load(Ordering::SeqCst), 1);

        // 4h old is stale for H1
        let later = base_time() + Duration::hours(8);
        source.fetch_at("XAUUSD", Timeframe::H1, start, end, later).unwrap();
        assert_eq!(source.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_refresh_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (start, end) = (base_time() - Duration::days(1), base_time() + Duration::days(1));
        let warm = CachedCandleSource::new(StubSource::new(hours(3)), dir.path());
        warm.fetch_at("XAUUSD", Timeframe::H4, start, end, base_time()).unwrap();

        let broken = CachedCandleSource::new(StubSource::new(Vec::new()), dir.path());
        let stale_now = base_time() + Duration::days(2);
        let candles = broken.fetch_at("XAUUSD", Timeframe::H4, start, end, stale_now).unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(broken.inner.calls.load(Ordering::SeqCst), 1);

        // nothing cached and nothing upstream
        assert!(broken.fetch_at("XAUUSD", Timeframe::Daily, start, end, stale_now).is_err());
    }

    #[test]
    fn test_merge_prefers_fetched() {
        let cached = vec![candle(0, 1.0, 1.0, 1.0, 1.0), candle(1, 2.0, 2.0, 2.0, 2.0)];
        let fetched = vec![candle(1, 3.0, 3.0, 3.0, 3.0), candle(2, 4.0, 4.0, 4.0, 4.0)];
        let merged = merge(cached, fetched);
        let opens: Vec<f64> = merged.iter().map(|c| c.open).collect();
        assert_eq!(opens, vec![1.0, 3.0, 4.0]);
    }

    #[test]
    fn test_cache_trimmed_to_history_window() {
        let dir = tempfile::tempdir().unwrap();
        // ten days of hourly candles against a seven day H1 window
        let source = CachedCandleSource::new(StubSource::new(hours(240)), dir.path());
        let (start, end) = (base_time() - Duration::days(1), base_time() + Duration::days(11));
        let now = base_time() + Duration::hours(240);

        let candles = source.fetch_at("XAUUSD", Timeframe::H1, start, end, now).unwrap();
        assert_eq!(candles.len(), 169);
        assert_eq!(candles[0].timestamp, base_time() + Duration::hours(71));

        let stored = source.load("XAUUSD", Timeframe::H1).unwrap();
        assert_eq!(stored.len(), 169);
        assert_eq!(stored.last().unwrap().timestamp, base_time() + Duration::hours(239));
    }

    #[test]
    fn test_corrupt_cache_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("XAUUSD_1d.json.zst"), b"not zstd").unwrap();
        let source = CachedCandleSource::new(StubSource::new(hours(2)), dir.path());
        let (start, end) = (base_time(), base_time() + Duration::days(1));
        let candles = source.fetch_at("XAUUSD", Timeframe::Daily, start, end, base_time()).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(source.load("XAUUSD", Timeframe::Daily).unwrap().len(), 2);
    }
}
