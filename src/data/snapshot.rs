//! Snapshot assembly: candles for every timeframe, the economic calendar and
//! the DXY/bond quotes, all as of one instant.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use futures::future::join_all;
use tracing::{info, warn};

use super::CandleSource;
use crate::trading_core::{AlignmentInput, EconomicEvent, MarketSnapshot, Timeframe, TimeframeCandles};

/// Optional side files next to the candle data
#[derive(Debug, Clone, Default)]
pub struct SnapshotFiles {
    pub events: Option<PathBuf>,
    pub alignment: Option<PathBuf>,
}

/// Step back from Saturday or Sunday to the Friday before
pub fn last_business_day(now: DateTime<Utc>) -> DateTime<Utc> {
    match now.weekday() {
        Weekday::Sat => now - Duration::days(1),
        Weekday::Sun => now - Duration::days(2),
        _ => now,
    }
}

/// `[end - history window, end]` for one timeframe
pub fn fetch_window(timeframe: Timeframe, end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (end - timeframe.history_window(), end)
}

/// Fetch every timeframe concurrently. A failed fetch leaves that series empty.
pub async fn load_candles(source: Arc<dyn CandleSource>, instrument: &str, as_of: DateTime<Utc>) -> TimeframeCandles {
    let end = last_business_day(as_of);
    let tasks = Timeframe::ALL.map(|timeframe| {
        let source = Arc::clone(&source);
        let instrument = instrument.to_string();
        let (start, end) = fetch_window(timeframe, end);
        tokio::task::spawn_blocking(move || (timeframe, source.fetch(&instrument, timeframe, start, end)))
    });

    let mut candles = TimeframeCandles::default();
    for joined in join_all(tasks).await {
        match joined {
            Ok((timeframe, Ok(series))) => {
                info!("{} {}: {} candles", instrument, timeframe, series.len());
                candles.set(timeframe, series);
            }
            Ok((timeframe, Err(e))) => warn!("{} {} fetch failed: {:#}", instrument, timeframe, e),
            Err(e) => warn!("{} candle fetch task failed: {}", instrument, e),
        }
    }
    candles.normalize();
    candles
}

pub fn load_events(path: &Path) -> Result<Vec<EconomicEvent>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read events {:?}", path))?;
    let events = serde_json::from_str(&text).with_context(|| format!("Invalid events file {:?}", path))?;
    Ok(events)
}

/// `{dxy_current, dxy_previous, bond_current, bond_previous, bond_symbol}`
pub fn load_alignment(path: &Path) -> Result<AlignmentInput> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read alignment {:?}", path))?;
    let alignment = serde_json::from_str(&text).with_context(|| format!("Invalid alignment file {:?}", path))?;
    Ok(alignment)
}

/// Everything the report needs for `instrument` as of `as_of`
pub async fn load_snapshot(
    source: Arc<dyn CandleSource>,
    instrument: &str,
    as_of: DateTime<Utc>,
    files: &SnapshotFiles,
) -> Result<MarketSnapshot> {
    let mut snapshot = MarketSnapshot::new(instrument, as_of);
    snapshot.candles = load_candles(source, instrument, as_of).await;
    if let Some(path) = &files.events {
        snapshot.events = load_events(path)?;
    }
    if let Some(path) = &files.alignment {
        snapshot.alignment = Some(load_alignment(path)?);
    }
    snapshot.normalize();
    info!(
        "Snapshot {} @ {}: {} events, alignment {}",
        instrument,
        as_of,
        snapshot.events.len(),
        if snapshot.alignment.is_some() { "loaded" } else { "missing" }
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{within, DataError};
    use crate::trading_core::candles::test_support::base_time;
    use crate::trading_core::{Candle, ImpactLevel};
    use std::sync::Mutex;

    /// Hourly candles for H1 and H4 only; records the requested windows
    struct FakeSource {
        requests: Mutex<Vec<(Timeframe, DateTime<Utc>, DateTime<Utc>)>>,
    }

    impl CandleSource for FakeSource {
        fn fetch(
            &self,
            instrument: &str,
            timeframe: Timeframe,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Candle>> {
            self.requests.lock().unwrap().push((timeframe, start, end));
            if !matches!(timeframe, Timeframe::H1 | Timeframe::H4) {
                return Err(DataError::Unavailable {
                    instrument: instrument.to_string(),
                    timeframe,
                }
                .into());
            }
            let candles = (0..48)
                .rev()
                .map(|h| Candle::new(end - Duration::hours(h), 4500.0, 4504.0, 4496.0, 4502.0))
                .collect();
            Ok(within(candles, start, end))
        }
    }

    #[test]
    fn test_last_business_day() {
        // 2026-01-12 is a Monday
        let saturday = base_time() + Duration::days(5);
        let sunday = base_time() + Duration::days(6);
        assert_eq!(last_business_day(saturday), base_time() + Duration::days(4));
        assert_eq!(last_business_day(sunday), base_time() + Duration::days(4));
        assert_eq!(last_business_day(base_time()), base_time());
    }

    #[test]
    fn test_fetch_windows() {
        let end = base_time();
        assert_eq!(fetch_window(Timeframe::Weekly, end).0, end - Duration::weeks(26));
        assert_eq!(fetch_window(Timeframe::Daily, end).0, end - Duration::days(30));
        assert_eq!(fetch_window(Timeframe::H4, end).0, end - Duration::days(20));
        assert_eq!(fetch_window(Timeframe::H1, end).0, end - Duration::days(7));
    }

    #[tokio::test]
    async fn test_load_snapshot_tolerates_missing_timeframes() {
        let dir = tempfile::tempdir().unwrap();
        let events_path = dir.path().join("events.json");
        std::fs::write(
            &events_path,
            r#"[{"date":"2026-01-16T13:30:00Z","importance":"high","currency":"USD","description":"Non-Farm Payrolls"},
                {"date":"2026-01-16T10:00:00Z","importance":"low","currency":"EUR","description":"ZEW","forecast":12.5}]"#,
        )
        .unwrap();
        let alignment_path = dir.path().join("alignment.json");
        std::fs::write(
            &alignment_path,
            r#"{"dxy_current":99.1,"dxy_previous":99.4,"bond_current":4.12,"bond_previous":4.15}"#,
        )
        .unwrap();

        let source = Arc::new(FakeSource {
            requests: Mutex::new(Vec::new()),
        });
        let sunday = base_time() + Duration::days(6) + Duration::hours(12);
        let files = SnapshotFiles {
            events: Some(events_path),
            alignment: Some(alignment_path),
        };
        let snapshot = load_snapshot(source.clone(), "XAUUSD", sunday, &files).await.unwrap();

        assert_eq!(snapshot.as_of, sunday);
        assert!(snapshot.candles.weekly.is_empty() && snapshot.candles.daily.is_empty());
        assert_eq!(snapshot.candles.h1.len(), 48);
        assert_eq!(snapshot.candles.h4.len(), 48);
        // sorted by date after normalisation
        assert_eq!(snapshot.events[0].description, "ZEW");
        assert_eq!(snapshot.events[1].importance, ImpactLevel::High);
        let alignment = snapshot.alignment.unwrap();
        assert_eq!(alignment.bond_symbol, "US10Y");

        let requests = source.requests.lock().unwrap();
        assert_eq!(requests.len(), 4);
        let friday = sunday - Duration::days(2);
        assert!(requests.iter().all(|(_, _, end)| *end == friday));
    }

    #[tokio::test]
    async fn test_bad_events_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, "{not json").unwrap();
        let source: Arc<dyn CandleSource> = Arc::new(FakeSource {
            requests: Mutex::new(Vec::new()),
        });
        let files = SnapshotFiles {
            events: Some(path),
            alignment: None,
        };
        assert!(load_snapshot(source, "XAUUSD", base_time(), &files).await.is_err());
    }
}
