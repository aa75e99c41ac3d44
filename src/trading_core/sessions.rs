//! Trading sessions and the previous-day market review
//!
//! Two session maps exist. Reaction history buckets every hour of the day
//! (Asia 23-08, London 08-13, New York 13-23 UTC). The daily review only looks
//! at the core windows (Asia 00-06, London 07-11, New York 12-21 UTC) and
//! leaves the hours in between unassigned.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::candles::{direction_from_change, percent_change, round2, Candle, TrendDirection};
use super::indicators::{session_volatility, VolatilityLevel, VolatilitySummary};
use super::levels::{describe_breaks, detect_session_breaks, PsychologicalBreak};
use crate::config::SessionConfig;
use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingSession {
    Asia,
    London,
    NewYork,
}

impl TradingSession {
    pub const ALL: [TradingSession; 3] = [TradingSession::Asia, TradingSession::London, TradingSession::NewYork];

    /// Session bucket for a reaction at the given UTC hour
    pub fn from_reaction_hour(hour: u32) -> Self {
        match hour {
            8..=12 => TradingSession::London,
            13..=22 => TradingSession::NewYork,
            _ => TradingSession::Asia,
        }
    }

    /// Core daily window as (start hour, end hour), end exclusive
    pub fn window(&self) -> (u32, u32) {
        match self {
            TradingSession::Asia => (0, 6),
            TradingSession::London => (7, 11),
            TradingSession::NewYork => (12, 21),
        }
    }

    /// Session whose core window contains the timestamp, if any
    pub fn containing(timestamp: DateTime<Utc>) -> Option<Self> {
        let hour = timestamp.hour();
        Self::ALL.into_iter().find(|s| {
            let (start, end) = s.window();
            hour >= start && hour < end
        })
    }

    pub fn time_range(&self) -> (String, String) {
        let (start, end) = self.window();
        (format!("{:02}:00", start), format!("{:02}:00", end))
    }
}

impl std::fmt::Display for TradingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingSession::Asia => write!(f, "Asia"),
            TradingSession::London => write!(f, "London"),
            TradingSession::NewYork => write!(f, "New York"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnalysis {
    pub session: TradingSession,
    pub start_time: String,
    pub end_time: String,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub range: f64,
    pub direction: TrendDirection,
    pub change_percent: f64,
    pub broke_previous_high: bool,
    pub broke_previous_low: bool,
    pub volatility: VolatilitySummary,
    pub psychological_breaks: Vec<PsychologicalBreak>,
    pub description: String,
}

/// Review of the most recent complete day in an intraday series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAnalysis {
    pub instrument: String,
    pub date: NaiveDate,
    pub previous_day_close: f64,
    pub current_day_close: f64,
    pub daily_change_percent: f64,
    pub daily_direction: TrendDirection,
    pub previous_day_high: Option<f64>,
    pub previous_day_low: Option<f64>,
    pub sessions: Vec<SessionAnalysis>,
    pub summary: String,
}

impl DailyAnalysis {
    /// Mean session range as a percent of the day's close
    pub fn mean_session_range_percent(&self) -> f64 {
        if self.sessions.is_empty() || self.current_day_close == 0.0 {
            return 0.0;
        }
        let mean_range = self.sessions.iter().map(|s| s.range).sum::<f64>() / self.sessions.len() as f64;
        mean_range / self.current_day_close * 100.0
    }

    /// At least two sessions that did not all move the same way
    pub fn has_mixed_sessions(&self) -> bool {
        self.sessions.len() >= 2 && self.sessions.iter().any(|s| s.direction != self.sessions[0].direction)
    }

    /// Net count of bullish minus bearish sessions
    pub fn session_balance(&self) -> i32 {
        self.sessions
            .iter()
            .map(|s| match s.direction {
                TrendDirection::Bullish => 1,
                TrendDirection::Bearish => -1,
                TrendDirection::Neutral => 0,
            })
            .sum()
    }

    pub fn session_low(&self) -> Option<f64> {
        self.sessions.iter().map(|s| s.low).reduce(f64::min)
    }

    pub fn session_high(&self) -> Option<f64> {
        self.sessions.iter().map(|s| s.high).reduce(f64::max)
    }
}

fn describe_session(analysis: &SessionAnalysis) -> String {
    let range_threshold = analysis.open * 0.002;
    let range_text = if analysis.range < range_threshold {
        "narrow range"
    } else if analysis.range < range_threshold * 2.0 {
        "moderate range"
    } else {
        "wide range"
    };

    let strong = analysis.change_percent.abs() > 0.5;
    let direction_text = match (analysis.direction, strong) {
        (TrendDirection::Bullish, true) => "strong bullish impulse",
        (TrendDirection::Bullish, false) => "bullish impulse",
        (TrendDirection::Bearish, true) => "strong bearish impulse",
        (TrendDirection::Bearish, false) => "bearish impulse",
        (TrendDirection::Neutral, _) => "sideways movement",
    };

    let mut description = format!("{} session: {}, {}", analysis.session, range_text, direction_text);
    if analysis.volatility.level != VolatilityLevel::Normal {
        description.push_str(&format!(", {} volatility", analysis.volatility.level));
    }
    if analysis.broke_previous_high {
        description.push_str(" breaking the previous day's high");
    } else if analysis.broke_previous_low {
        description.push_str(" breaking the previous day's low");
    }
    let breaks = describe_breaks(&analysis.psychological_breaks);
    if !breaks.is_empty() {
        description.push_str(&format!(". {}", breaks));
    }
    description
}

/// Analyse one session's candles against the previous day's extremes
pub fn analyze_session(
    session: TradingSession,
    candles: &[Candle],
    previous_high: Option<f64>,
    previous_low: Option<f64>,
    historical: Option<&[Candle]>,
    config: &SessionConfig,
) -> Result<SessionAnalysis, AnalysisError> {
    let (first, last) = match (candles.first(), candles.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(AnalysisError::EmptyCandles(format!("{} session", session))),
    };

    let open = first.open;
    let close = last.close;
    let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let (start_time, end_time) = session.time_range();

    let mut analysis = SessionAnalysis {
        session,
        start_time,
        end_time,
        open,
        close,
        high,
        low,
        range: high - low,
        direction: direction_from_change(open, close, config.direction_threshold_percent),
        change_percent: if open > 0.0 { percent_change(close, open) } else { 0.0 },
        broke_previous_high: previous_high.is_some_and(|h| high > h),
        broke_previous_low: previous_low.is_some_and(|l| low < l),
        volatility: session_volatility(candles, historical, config.volatility_period)?,
        psychological_breaks: detect_session_breaks(candles, config.break_tolerance),
        description: String::new(),
    };
    analysis.description = describe_session(&analysis);
    Ok(analysis)
}

/// Review the last calendar day (UTC) present in an intraday series, using
/// the day before it for the previous close and extremes.
pub fn analyze_latest_day(
    instrument: &str,
    candles: &[Candle],
    config: &SessionConfig,
) -> Result<DailyAnalysis, AnalysisError> {
    let last = candles
        .last()
        .ok_or_else(|| AnalysisError::EmptyCandles(format!("{} intraday", instrument)))?;
    let date = last.timestamp.date_naive();

    let day: Vec<Candle> = candles.iter().filter(|c| c.timestamp.date_naive() == date).cloned().collect();
    let day_before_date = candles
        .iter()
        .map(|c| c.timestamp.date_naive())
        .filter(|d| *d < date)
        .max();
    let day_before: Vec<Candle> = match day_before_date {
        Some(d) => candles.iter().filter(|c| c.timestamp.date_naive() == d).cloned().collect(),
        None => Vec::new(),
    };

    let first_open = day[0].open;
    let current_close = day[day.len() - 1].close;
    let previous_close = day_before.last().map(|c| c.close).unwrap_or(first_open);
    let previous_high = day_before.iter().map(|c| c.high).reduce(f64::max);
    let previous_low = day_before.iter().map(|c| c.low).reduce(f64::min);

    let mut sessions = Vec::new();
    for session in TradingSession::ALL {
        let session_candles: Vec<Candle> = day
            .iter()
            .filter(|c| TradingSession::containing(c.timestamp) == Some(session))
            .cloned()
            .collect();
        if session_candles.is_empty() {
            continue;
        }
        sessions.push(analyze_session(
            session,
            &session_candles,
            previous_high,
            previous_low,
            None,
            config,
        )?);
    }

    let change_percent = percent_change(current_close, previous_close);
    let close_direction = direction_from_change(previous_close, current_close, config.direction_threshold_percent);
    let mut summary = format!(
        "Yesterday {} closed {} ({:.2}%).",
        instrument,
        match close_direction {
            TrendDirection::Bullish => "bullish",
            TrendDirection::Bearish => "bearish",
            TrendDirection::Neutral => "flat",
        },
        change_percent
    );
    for session in &sessions {
        summary.push_str(&format!("\n{}.", session.description));
    }

    Ok(DailyAnalysis {
        instrument: instrument.to_string(),
        date,
        previous_day_close: previous_close,
        current_day_close: current_close,
        daily_change_percent: round2(change_percent),
        daily_direction: direction_from_change(first_open, current_close, config.direction_threshold_percent),
        previous_day_high: previous_high,
        previous_day_low: previous_low,
        sessions,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::candles::test_support::candle;

    #[test]
    fn test_reaction_hours() {
        assert_eq!(TradingSession::from_reaction_hour(23), TradingSession::Asia);
        assert_eq!(TradingSession::from_reaction_hour(7), TradingSession::Asia);
        assert_eq!(TradingSession::from_reaction_hour(8), TradingSession::London);
        assert_eq!(TradingSession::from_reaction_hour(13), TradingSession::NewYork);
        assert_eq!(TradingSession::from_reaction_hour(22), TradingSession::NewYork);
    }

    #[test]
    fn test_daily_windows_leave_gaps() {
        let base = crate::trading_core::candles::test_support::base_time();
        let at = |h: i64| base + chrono::Duration::hours(h);
        assert_eq!(TradingSession::containing(at(0)), Some(TradingSession::Asia));
        assert_eq!(TradingSession::containing(at(6)), None);
        assert_eq!(TradingSession::containing(at(10)), Some(TradingSession::London));
        assert_eq!(TradingSession::containing(at(21)), None);
        assert_eq!(TradingSession::London.time_range(), ("07:00".to_string(), "11:00".to_string()));
    }

    #[test]
    fn test_analyze_session_empty_fails() {
        let err = analyze_session(TradingSession::Asia, &[], None, None, None, &SessionConfig::default());
        assert!(matches!(err, Err(AnalysisError::EmptyCandles(_))));
    }

    #[test]
    fn test_analyze_session_description() {
        let candles = vec![
            candle(12, 4480.0, 4492.0, 4478.0, 4490.0),
            candle(13, 4490.0, 4512.0, 4488.0, 4510.0),
            candle(14, 4510.0, 4515.0, 4505.0, 4512.0),
        ];
        let analysis = analyze_session(
            TradingSession::NewYork,
            &candles,
            Some(4505.0),
            Some(4470.0),
            None,
            &SessionConfig::default(),
        )
        .unwrap();
        assert_eq!(analysis.direction, TrendDirection::Bullish);
        assert_eq!(analysis.range, 37.0);
        assert!(analysis.broke_previous_high);
        assert!(!analysis.broke_previous_low);
        assert!(analysis.description.starts_with("New York session: wide range, strong bullish impulse"));
        assert!(analysis.description.contains("breaking the previous day's high"));
        assert!(analysis.description.contains("Bullish break of 4500"));
    }

    #[test]
    fn test_analyze_latest_day_uses_previous_date() {
        let mut candles = vec![
            candle(-20, 4450.0, 4470.0, 4440.0, 4460.0),
            candle(-14, 4460.0, 4480.0, 4455.0, 4470.0),
        ];
        candles.extend([
            candle(1, 4470.0, 4478.0, 4468.0, 4475.0),
            candle(8, 4475.0, 4490.0, 4472.0, 4488.0),
            candle(13, 4488.0, 4496.0, 4485.0, 4494.0),
            candle(22, 4494.0, 4499.0, 4490.0, 4497.0),
        ]);
        let daily = analyze_latest_day("XAUUSD", &candles, &SessionConfig::default()).unwrap();
        assert_eq!(daily.previous_day_close, 4470.0);
        assert_eq!(daily.current_day_close, 4497.0);
        assert_eq!(daily.previous_day_high, Some(4480.0));
        assert_eq!(daily.sessions.len(), 3);
        assert_eq!(daily.daily_direction, TrendDirection::Bullish);
        assert_eq!(daily.session_balance(), 3);
        assert!(!daily.has_mixed_sessions());
        assert!(daily.summary.starts_with("Yesterday XAUUSD closed bullish (0.60%)."));
    }

    #[test]
    fn test_single_day_falls_back_to_first_open() {
        let candles = vec![candle(1, 4470.0, 4478.0, 4468.0, 4465.0)];
        let daily = analyze_latest_day("XAUUSD", &candles, &SessionConfig::default()).unwrap();
        assert_eq!(daily.previous_day_close, 4470.0);
        assert_eq!(daily.previous_day_high, None);
        assert_eq!(daily.daily_direction, TrendDirection::Bearish);
        assert!(analyze_latest_day("XAUUSD", &[], &SessionConfig::default()).is_err());
    }
}
