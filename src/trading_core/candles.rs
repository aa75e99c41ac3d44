//! OHLC candles and the small vocabulary shared by every analysis stage

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One OHLC interval. Volume is `None` when the provider does not report it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl Candle {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Trend direction of a candle window, session or timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Bullish => write!(f, "bullish"),
            TrendDirection::Bearish => write!(f, "bearish"),
            TrendDirection::Neutral => write!(f, "neutral"),
        }
    }
}

/// Candle intervals the advisor works with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Weekly,
    Daily,
    H4,
    H1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::Weekly,
        Timeframe::Daily,
        Timeframe::H4,
        Timeframe::H1,
    ];

    /// Interval code used in data file names
    pub fn code(&self) -> &'static str {
        match self {
            Timeframe::Weekly => "1w",
            Timeframe::Daily => "1d",
            Timeframe::H4 => "4h",
            Timeframe::H1 => "1h",
        }
    }

    /// Age after which the newest cached candle is considered stale
    pub fn staleness_threshold(&self) -> Duration {
        match self {
            Timeframe::Weekly => Duration::days(7),
            Timeframe::Daily => Duration::days(1),
            Timeframe::H4 => Duration::hours(5),
            Timeframe::H1 => Duration::hours(2),
        }
    }

    /// How far back to request history for this interval
    pub fn history_window(&self) -> Duration {
        match self {
            Timeframe::Weekly => Duration::weeks(26),
            Timeframe::Daily => Duration::days(30),
            Timeframe::H4 => Duration::days(20),
            Timeframe::H1 => Duration::days(7),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timeframe::Weekly => write!(f, "Weekly"),
            Timeframe::Daily => write!(f, "Daily"),
            Timeframe::H4 => write!(f, "H4"),
            Timeframe::H1 => write!(f, "H1"),
        }
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weekly" | "1w" | "w1" => Ok(Timeframe::Weekly),
            "daily" | "1d" | "d1" => Ok(Timeframe::Daily),
            "h4" | "4h" => Ok(Timeframe::H4),
            "h1" | "1h" => Ok(Timeframe::H1),
            other => Err(format!("unknown timeframe '{}'", other)),
        }
    }
}

/// One candle series per timeframe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeframeCandles {
    pub weekly: Vec<Candle>,
    pub daily: Vec<Candle>,
    pub h4: Vec<Candle>,
    pub h1: Vec<Candle>,
}

impl TimeframeCandles {
    pub fn get(&self, timeframe: Timeframe) -> &[Candle] {
        match timeframe {
            Timeframe::Weekly => &self.weekly,
            Timeframe::Daily => &self.daily,
            Timeframe::H4 => &self.h4,
            Timeframe::H1 => &self.h1,
        }
    }

    pub fn set(&mut self, timeframe: Timeframe, candles: Vec<Candle>) {
        match timeframe {
            Timeframe::Weekly => self.weekly = candles,
            Timeframe::Daily => self.daily = candles,
            Timeframe::H4 => self.h4 = candles,
            Timeframe::H1 => self.h1 = candles,
        }
    }

    /// Sort every series chronologically
    pub fn normalize(&mut self) {
        for series in [&mut self.weekly, &mut self.daily, &mut self.h4, &mut self.h1] {
            sort_candles(series);
        }
    }

    /// Close of the most granular non-empty series
    pub fn latest_close(&self) -> Option<f64> {
        [&self.h1, &self.h4, &self.daily, &self.weekly]
            .into_iter()
            .find_map(|series| series.last())
            .map(|c| c.close)
    }
}

/// Stable chronological sort; equal timestamps keep their input order
pub fn sort_candles(candles: &mut [Candle]) {
    candles.sort_by_key(|c| c.timestamp);
}

/// Direction from an open/close pair. `threshold_percent` is the minimum
/// percent change that counts as a move.
pub fn direction_from_change(open: f64, close: f64, threshold_percent: f64) -> TrendDirection {
    if open == 0.0 {
        return TrendDirection::Neutral;
    }
    let change_percent = (close - open) / open * 100.0;
    if change_percent > threshold_percent {
        TrendDirection::Bullish
    } else if change_percent < -threshold_percent {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    }
}

/// Percent change from `previous` to `current`, 0 when there is no base
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    (current - previous) / previous * 100.0
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub(crate) fn round2(value: f64) -> f64 {
    round_to(value, 2)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_candle_anatomy() {
        let c = candle(0, 100.0, 110.0, 90.0, 105.0);
        assert_eq!(c.body(), 5.0);
        assert_eq!(c.range(), 20.0);
        assert_eq!(c.upper_wick(), 5.0);
        assert_eq!(c.lower_wick(), 10.0);
        assert!(c.is_bullish());
        assert!(!c.is_bearish());
    }

    #[test]
    fn test_direction_from_change() {
        assert_eq!(direction_from_change(100.0, 101.0, 0.001), TrendDirection::Bullish);
        assert_eq!(direction_from_change(100.0, 99.0, 0.001), TrendDirection::Bearish);
        assert_eq!(direction_from_change(100.0, 100.0, 0.001), TrendDirection::Neutral);
        assert_eq!(direction_from_change(0.0, 100.0, 0.001), TrendDirection::Neutral);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut candles = vec![
            candle(2, 1.0, 1.0, 1.0, 1.0),
            candle(1, 2.0, 2.0, 2.0, 2.0),
            candle(1, 3.0, 3.0, 3.0, 3.0),
        ];
        sort_candles(&mut candles);
        let opens: Vec<f64> = candles.iter().map(|c| c.open).collect();
        assert_eq!(opens, vec![2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_timeframe_parsing() {
        assert_eq!("H4".parse::<Timeframe>().unwrap(), Timeframe::H4);
        assert_eq!("1d".parse::<Timeframe>().unwrap(), Timeframe::Daily);
        assert!("m5".parse::<Timeframe>().is_err());
        assert_eq!(Timeframe::H1.staleness_threshold(), Duration::hours(2));
    }

    #[test]
    fn test_timeframe_candles() {
        let mut set = TimeframeCandles::default();
        assert_eq!(set.latest_close(), None);
        set.set(Timeframe::Daily, vec![candle(24, 1.0, 2.0, 0.5, 1.5), candle(0, 1.0, 2.0, 0.5, 1.2)]);
        set.normalize();
        assert_eq!(set.get(Timeframe::Daily)[0].close, 1.2);
        assert_eq!(set.latest_close(), Some(1.5));

        set.set(Timeframe::H1, vec![candle(30, 1.5, 1.9, 1.4, 1.8)]);
        assert_eq!(set.latest_close(), Some(1.8));
    }

    #[test]
    fn test_volume_defaults_to_unknown() {
        let json = r#"{"timestamp":"2026-01-12T00:00:00Z","open":1.0,"high":2.0,"low":0.5,"close":1.5}"#;
        let c: Candle = serde_json::from_str(json).unwrap();
        assert_eq!(c.volume, None);
    }
}
