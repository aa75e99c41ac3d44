//! Technical picture per timeframe
//!
//! Each timeframe is analysed on its own. A failure on one of them is kept
//! in the result next to the ones that worked, so the rest of the pipeline
//! can carry on with partial data.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::candles::{round2, Candle, Timeframe, TimeframeCandles, TrendDirection};
use super::indicators::{
    ema, find_support_resistance, identify_trend, impulse_strength, is_near_level, rsi, rsi_zone, Impulse,
    SupportResistance,
};
use super::levels::{analyze_round_levels, Level};
use super::patterns::{detect_retests, Retest};
use crate::config::AdvisorConfig;
use crate::error::AnalysisError;

/// The levels that matter most around the current price
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PsychologicalContext {
    pub nearest_support: Option<Level>,
    pub nearest_resistance: Option<Level>,
    pub strongest_support: Option<Level>,
    pub strongest_resistance: Option<Level>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeAnalysis {
    pub timeframe: Timeframe,
    pub current_price: f64,
    pub trend: TrendDirection,
    /// H4 only
    pub rsi: Option<f64>,
    pub rsi_zone: Option<f64>,
    /// H4 only
    pub impulse: Option<Impulse>,
    /// Keyed by period; periods without enough candles are absent
    pub ema: BTreeMap<usize, f64>,
    pub support_resistance: Option<SupportResistance>,
    pub near_support: bool,
    pub near_resistance: bool,
    pub psychological_context: PsychologicalContext,
    pub retests: Vec<Retest>,
    pub candle_count: usize,
    pub last_candle_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TimeframeReport {
    Analyzed(TimeframeAnalysis),
    Failed { timeframe: Timeframe, error: String },
}

impl TimeframeReport {
    pub fn analysis(&self) -> Option<&TimeframeAnalysis> {
        match self {
            TimeframeReport::Analyzed(analysis) => Some(analysis),
            TimeframeReport::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTimeframeAnalysis {
    pub timeframes: BTreeMap<Timeframe, TimeframeReport>,
    pub summary: String,
}

impl MultiTimeframeAnalysis {
    pub fn get(&self, timeframe: Timeframe) -> Option<&TimeframeAnalysis> {
        self.timeframes.get(&timeframe).and_then(|r| r.analysis())
    }

    /// Trend of a timeframe, neutral when it could not be analysed
    pub fn trend(&self, timeframe: Timeframe) -> TrendDirection {
        self.get(timeframe).map_or(TrendDirection::Neutral, |a| a.trend)
    }

    pub fn trends(&self) -> BTreeMap<Timeframe, TrendDirection> {
        self.timeframes
            .iter()
            .filter_map(|(tf, report)| report.analysis().map(|a| (*tf, a.trend)))
            .collect()
    }
}

/// Analyse one timeframe's candles (sorted, oldest first)
pub fn analyze_timeframe(
    timeframe: Timeframe,
    candles: &[Candle],
    config: &AdvisorConfig,
) -> Result<TimeframeAnalysis, AnalysisError> {
    let Some(last) = candles.last() else {
        return Err(AnalysisError::EmptyCandles(timeframe.to_string()));
    };
    let settings = &config.indicators;
    let current_price = last.close;

    let trend = identify_trend(candles, settings.trend_lookback)?;

    let (rsi_value, zone, impulse) = if timeframe == Timeframe::H4 {
        let value = rsi(candles, settings.rsi_period)?;
        (
            value,
            rsi_zone(value, &settings.rsi_zones),
            impulse_strength(candles, settings.impulse_lookback)?,
        )
    } else {
        (None, None, None)
    };

    let emas = ema(candles, &settings.ema_periods)?;

    let support_resistance = find_support_resistance(candles, settings.support_resistance_lookback)?;
    let (near_support, near_resistance) = support_resistance.map_or((false, false), |sr| {
        (
            is_near_level(current_price, sr.support, settings.near_level_percent),
            is_near_level(current_price, sr.resistance, settings.near_level_percent),
        )
    });

    let max_distance = if timeframe == Timeframe::H4 {
        settings.h4_level_distance
    } else {
        settings.default_level_distance
    };
    let map = analyze_round_levels(current_price, candles, max_distance, &config.levels)?;

    let nearest: Vec<f64> = [&map.nearest_support, &map.nearest_resistance]
        .into_iter()
        .flatten()
        .map(|l| l.price)
        .collect();
    let retests = detect_retests(candles, &nearest, settings.retest_lookback, settings.retest_tolerance);

    Ok(TimeframeAnalysis {
        timeframe,
        current_price: round2(current_price),
        trend,
        rsi: rsi_value,
        rsi_zone: zone,
        impulse,
        ema: emas,
        support_resistance,
        near_support,
        near_resistance,
        psychological_context: PsychologicalContext {
            nearest_support: map.nearest_support,
            nearest_resistance: map.nearest_resistance,
            strongest_support: map.strongest_support,
            strongest_resistance: map.strongest_resistance,
        },
        retests,
        candle_count: candles.len(),
        last_candle_time: last.timestamp,
    })
}

fn summarize(timeframes: &BTreeMap<Timeframe, TimeframeReport>) -> String {
    let mut parts = Vec::new();
    let analysis = |tf: Timeframe| timeframes.get(&tf).and_then(|r| r.analysis());

    if let Some(weekly) = analysis(Timeframe::Weekly) {
        parts.push(format!("Weekly: {}", weekly.trend));
    }
    if let Some(daily) = analysis(Timeframe::Daily) {
        parts.push(format!("Daily trend: {}", daily.trend));
    }
    if let Some(h4) = analysis(Timeframe::H4) {
        parts.push(format!("H4: {}", h4.trend));
        if let Some(value) = h4.rsi {
            parts.push(format!("RSI H4: {}", value));
            if let Some(zone) = h4.rsi_zone {
                parts.push(format!("RSI in zone: {}", zone));
            }
        }
        if let Some(impulse) = h4.impulse.filter(|i| i.is_strong) {
            parts.push(format!(
                "H4 impulse: {} (strong, {}%)",
                impulse.direction, impulse.distance_percent
            ));
        }
    }
    if let Some(h1) = analysis(Timeframe::H1) {
        parts.push(format!("H1: {} (confirmation)", h1.trend));
    }
    parts.join(" | ")
}

/// Analyse weekly, daily, H4 and H1 independently
pub fn analyze_multi_timeframe(candles: &TimeframeCandles, config: &AdvisorConfig) -> MultiTimeframeAnalysis {
    let mut timeframes = BTreeMap::new();
    for timeframe in Timeframe::ALL {
        let series = candles.get(timeframe);
        let report = match analyze_timeframe(timeframe, series, config) {
            Ok(analysis) => {
                debug!("{} analysed: {} candles, trend {}", timeframe, series.len(), analysis.trend);
                TimeframeReport::Analyzed(analysis)
            }
            Err(e) => {
                warn!("{} analysis failed: {}", timeframe, e);
                TimeframeReport::Failed {
                    timeframe,
                    error: e.to_string(),
                }
            }
        };
        timeframes.insert(timeframe, report);
    }

    let summary = summarize(&timeframes);
    MultiTimeframeAnalysis { timeframes, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::candles::test_support::from_closes;

    fn rising(n: usize, start: f64, step: f64) -> Vec<Candle> {
        let closes: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
        from_closes(&closes)
    }

    #[test]
    fn test_empty_timeframe_is_error() {
        let err = analyze_timeframe(Timeframe::Daily, &[], &AdvisorConfig::default()).unwrap_err();
        assert_eq!(err, AnalysisError::EmptyCandles("Daily".to_string()));
    }

    #[test]
    fn test_h4_gets_momentum_fields() {
        let candles = rising(60, 4400.0, 2.0);
        let config = AdvisorConfig::default();

        let h4 = analyze_timeframe(Timeframe::H4, &candles, &config).unwrap();
        assert_eq!(h4.trend, TrendDirection::Bullish);
        assert_eq!(h4.rsi, Some(100.0));
        assert!(h4.impulse.is_some());
        assert!(h4.ema.contains_key(&50));
        assert!(!h4.ema.contains_key(&100));
        assert_eq!(h4.candle_count, 60);
        assert_eq!(h4.current_price, 4518.0);

        let h1 = analyze_timeframe(Timeframe::H1, &candles, &config).unwrap();
        assert_eq!(h1.rsi, None);
        assert_eq!(h1.impulse, None);
    }

    #[test]
    fn test_psychological_context_and_retests() {
        // drifts down through 4500 and back up
        let mut closes: Vec<f64> = (0..15).map(|i| 4530.0 - i as f64 * 2.0).collect();
        closes.extend((0..10).map(|i| 4502.0 + i as f64 * 0.5));
        let candles = from_closes(&closes);
        let analysis = analyze_timeframe(Timeframe::H1, &candles, &AdvisorConfig::default()).unwrap();

        let context = &analysis.psychological_context;
        assert_eq!(context.nearest_support.as_ref().map(|l| l.price), Some(4500.0));
        assert_eq!(context.nearest_resistance.as_ref().map(|l| l.price), Some(4550.0));
        assert!(analysis.retests.iter().all(|r| r.level == 4500.0 || r.level == 4550.0));
    }

    #[test]
    fn test_multi_timeframe_keeps_failures() {
        let mut set = TimeframeCandles::default();
        set.daily = rising(30, 4400.0, 5.0);
        set.h4 = rising(60, 4400.0, 2.0);

        let result = analyze_multi_timeframe(&set, &AdvisorConfig::default());
        assert_eq!(result.timeframes.len(), 4);
        assert!(matches!(
            result.timeframes[&Timeframe::Weekly],
            TimeframeReport::Failed { timeframe: Timeframe::Weekly, .. }
        ));
        assert_eq!(result.trend(Timeframe::Weekly), TrendDirection::Neutral);
        assert_eq!(result.trend(Timeframe::Daily), TrendDirection::Bullish);
        assert_eq!(result.trends().len(), 2);
        assert!(result.summary.starts_with("Daily trend: bullish | H4: bullish | RSI H4: 100"));
        assert!(!result.summary.contains("H1"));
    }
}
