//! Multi-timeframe convergence and recent "hot zone" reactions

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::candles::{Candle, Timeframe, TrendDirection};

/// Share of timeframes that must agree for a partial convergence
const PARTIAL_CONVERGENCE_SHARE: f64 = 0.7;

/// Hot zones scoring at or below this are dropped
const MIN_HOT_ZONE_STRENGTH: f64 = 0.3;

const MAX_HOT_ZONES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceKind {
    FullBullish,
    FullBearish,
    PartialBullish,
    PartialBearish,
    Divergent,
    Neutral,
}

impl ConvergenceKind {
    pub fn strength(&self) -> f64 {
        match self {
            ConvergenceKind::FullBullish | ConvergenceKind::FullBearish => 1.0,
            ConvergenceKind::PartialBullish | ConvergenceKind::PartialBearish => 0.7,
            ConvergenceKind::Divergent => 0.3,
            ConvergenceKind::Neutral => 0.0,
        }
    }

    /// Direction the timeframes agree on, neutral when they do not
    pub fn direction(&self) -> TrendDirection {
        match self {
            ConvergenceKind::FullBullish | ConvergenceKind::PartialBullish => TrendDirection::Bullish,
            ConvergenceKind::FullBearish | ConvergenceKind::PartialBearish => TrendDirection::Bearish,
            ConvergenceKind::Divergent | ConvergenceKind::Neutral => TrendDirection::Neutral,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, ConvergenceKind::FullBullish | ConvergenceKind::FullBearish)
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, ConvergenceKind::PartialBullish | ConvergenceKind::PartialBearish)
    }
}

impl std::fmt::Display for ConvergenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConvergenceKind::FullBullish => write!(f, "full bullish convergence"),
            ConvergenceKind::FullBearish => write!(f, "full bearish convergence"),
            ConvergenceKind::PartialBullish => write!(f, "partial bullish convergence"),
            ConvergenceKind::PartialBearish => write!(f, "partial bearish convergence"),
            ConvergenceKind::Divergent => write!(f, "divergent"),
            ConvergenceKind::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceResult {
    pub classification: ConvergenceKind,
    pub strength: f64,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub neutral_count: usize,
}

/// Classify how far the timeframe trends agree
pub fn analyze_convergence(directions: &BTreeMap<Timeframe, TrendDirection>) -> ConvergenceResult {
    let count = |d: TrendDirection| directions.values().filter(|v| **v == d).count();
    let bullish = count(TrendDirection::Bullish);
    let bearish = count(TrendDirection::Bearish);
    let neutral = count(TrendDirection::Neutral);
    let total = directions.len();

    let classification = if total == 0 {
        ConvergenceKind::Neutral
    } else if bullish == total {
        ConvergenceKind::FullBullish
    } else if bearish == total {
        ConvergenceKind::FullBearish
    } else if bullish as f64 / total as f64 >= PARTIAL_CONVERGENCE_SHARE {
        ConvergenceKind::PartialBullish
    } else if bearish as f64 / total as f64 >= PARTIAL_CONVERGENCE_SHARE {
        ConvergenceKind::PartialBearish
    } else if bullish > 0 && bearish > 0 {
        ConvergenceKind::Divergent
    } else {
        ConvergenceKind::Neutral
    };

    ConvergenceResult {
        classification,
        strength: classification.strength(),
        bullish_count: bullish,
        bearish_count: bearish,
        neutral_count: neutral,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotZoneKind {
    Bounce,
    Rejection,
}

/// A fresh intraday reaction worth watching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotZone {
    pub price_level: f64,
    pub timeframe: Timeframe,
    pub reaction_type: HotZoneKind,
    pub timestamp: DateTime<Utc>,
    pub strength: f64,
    pub age_minutes: i64,
}

/// Lower low, bullish body, next candle closes higher
fn bounce_strength(candle: &Candle, prev: &Candle, next: &Candle) -> Option<f64> {
    if candle.low >= prev.low || !candle.is_bullish() || next.close <= candle.close {
        return None;
    }
    let body = candle.body();
    if body == 0.0 {
        return None;
    }
    let wick = candle.lower_wick();
    let wick_ratio = wick / (wick + body);
    let range = candle.range();
    let recovery = if range > 0.0 { (next.close - candle.low) / range } else { 0.0 };
    score(wick_ratio, recovery)
}

/// Higher high, bearish body, next candle closes lower
fn rejection_strength(candle: &Candle, prev: &Candle, next: &Candle) -> Option<f64> {
    if candle.high <= prev.high || !candle.is_bearish() || next.close >= candle.close {
        return None;
    }
    let body = candle.body();
    if body == 0.0 {
        return None;
    }
    let wick = candle.upper_wick();
    let wick_ratio = wick / (wick + body);
    let range = candle.range();
    let fall = if range > 0.0 { (candle.high - next.close) / range } else { 0.0 };
    score(wick_ratio, fall)
}

fn score(wick_ratio: f64, follow_through: f64) -> Option<f64> {
    let strength = (wick_ratio + follow_through) / 2.0;
    (strength > MIN_HOT_ZONE_STRENGTH).then(|| strength.min(1.0))
}

/// Strongest bounces and rejections among interior candles no older than
/// `lookback_minutes` before `now`
pub fn detect_hot_zones(
    candles: &[Candle],
    timeframe: Timeframe,
    now: DateTime<Utc>,
    lookback_minutes: i64,
) -> Vec<HotZone> {
    if candles.len() < 3 {
        return Vec::new();
    }
    let cutoff = now - Duration::minutes(lookback_minutes);

    let mut zones = Vec::new();
    for triple in candles.windows(3) {
        let (prev, candle, next) = (&triple[0], &triple[1], &triple[2]);
        if candle.timestamp < cutoff {
            continue;
        }
        let age_minutes = (now - candle.timestamp).num_minutes();
        if let Some(strength) = bounce_strength(candle, prev, next) {
            zones.push(HotZone {
                price_level: candle.low,
                timeframe,
                reaction_type: HotZoneKind::Bounce,
                timestamp: candle.timestamp,
                strength,
                age_minutes,
            });
        }
        if let Some(strength) = rejection_strength(candle, prev, next) {
            zones.push(HotZone {
                price_level: candle.high,
                timeframe,
                reaction_type: HotZoneKind::Rejection,
                timestamp: candle.timestamp,
                strength,
                age_minutes,
            });
        }
    }

    zones.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    zones.truncate(MAX_HOT_ZONES);
    zones
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::candles::test_support::{base_time, candle};

    fn directions(list: &[(Timeframe, TrendDirection)]) -> BTreeMap<Timeframe, TrendDirection> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_full_bullish() {
        let result = analyze_convergence(&directions(&[
            (Timeframe::Weekly, TrendDirection::Bullish),
            (Timeframe::Daily, TrendDirection::Bullish),
            (Timeframe::H4, TrendDirection::Bullish),
        ]));
        assert_eq!(result.classification, ConvergenceKind::FullBullish);
        assert_eq!(result.strength, 1.0);
    }

    #[test]
    fn test_mixed_is_divergent() {
        let result = analyze_convergence(&directions(&[
            (Timeframe::Weekly, TrendDirection::Bullish),
            (Timeframe::Daily, TrendDirection::Bearish),
            (Timeframe::H4, TrendDirection::Neutral),
        ]));
        assert_eq!(result.classification, ConvergenceKind::Divergent);
        assert_eq!(result.strength, 0.3);
    }

    #[test]
    fn test_partial_and_neutral() {
        let partial = analyze_convergence(&directions(&[
            (Timeframe::Weekly, TrendDirection::Bearish),
            (Timeframe::Daily, TrendDirection::Bearish),
            (Timeframe::H4, TrendDirection::Bearish),
            (Timeframe::H1, TrendDirection::Neutral),
        ]));
        assert_eq!(partial.classification, ConvergenceKind::PartialBearish);
        assert_eq!(partial.strength, 0.7);

        // two of three is under the 70% bar
        let neutral = analyze_convergence(&directions(&[
            (Timeframe::Weekly, TrendDirection::Bullish),
            (Timeframe::Daily, TrendDirection::Bullish),
            (Timeframe::H4, TrendDirection::Neutral),
        ]));
        assert_eq!(neutral.classification, ConvergenceKind::Neutral);

        assert_eq!(analyze_convergence(&BTreeMap::new()).classification, ConvergenceKind::Neutral);
    }

    #[test]
    fn test_hot_zone_bounce() {
        let candles = vec![
            candle(0, 4510.0, 4512.0, 4500.0, 4505.0),
            candle(1, 4500.0, 4506.0, 4490.0, 4504.0),
            candle(2, 4504.0, 4512.0, 4503.0, 4510.0),
        ];
        let now = base_time() + Duration::hours(3);
        let zones = detect_hot_zones(&candles, Timeframe::H1, now, 240);
        assert_eq!(zones.len(), 1);
        let zone = &zones[0];
        assert_eq!(zone.reaction_type, HotZoneKind::Bounce);
        assert_eq!(zone.price_level, 4490.0);
        assert_eq!(zone.age_minutes, 120);
        // wick ratio 10/14 and recovery 20/16 average to about 0.98
        assert!((zone.strength - (10.0 / 14.0 + 20.0 / 16.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_hot_zones_respect_lookback() {
        let candles = vec![
            candle(0, 4510.0, 4512.0, 4500.0, 4505.0),
            candle(1, 4500.0, 4506.0, 4490.0, 4504.0),
            candle(2, 4504.0, 4512.0, 4503.0, 4510.0),
        ];
        let now = base_time() + Duration::hours(10);
        assert!(detect_hot_zones(&candles, Timeframe::H1, now, 240).is_empty());
        assert!(detect_hot_zones(&candles[..2], Timeframe::H1, now, 240).is_empty());
    }
}
