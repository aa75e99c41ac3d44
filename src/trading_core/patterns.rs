//! Candlestick reaction patterns and retests of nearby levels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candles::{round2, Candle};
use super::levels::LevelKind;

/// Strength assumed for a retested level when no history is attached
pub const DEFAULT_RETEST_LEVEL_STRENGTH: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandlePattern {
    PinBarBullish,
    PinBarBearish,
    Hammer,
    ShootingStar,
    EngulfingBullish,
    EngulfingBearish,
    Doji,
    None,
}

impl CandlePattern {
    /// Probability boost the pattern gives to a bounce
    fn bounce_boost(&self) -> f64 {
        match self {
            CandlePattern::PinBarBullish | CandlePattern::PinBarBearish => 0.15,
            CandlePattern::Hammer | CandlePattern::ShootingStar => 0.12,
            CandlePattern::EngulfingBullish | CandlePattern::EngulfingBearish => 0.10,
            CandlePattern::Doji => 0.05,
            CandlePattern::None => 0.0,
        }
    }

    fn is_bullish_reversal(&self) -> bool {
        matches!(self, CandlePattern::PinBarBullish | CandlePattern::Hammer)
    }

    fn is_bearish_reversal(&self) -> bool {
        matches!(self, CandlePattern::PinBarBearish | CandlePattern::ShootingStar)
    }
}

impl std::fmt::Display for CandlePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandlePattern::PinBarBullish => write!(f, "bullish pin bar"),
            CandlePattern::PinBarBearish => write!(f, "bearish pin bar"),
            CandlePattern::Hammer => write!(f, "hammer"),
            CandlePattern::ShootingStar => write!(f, "shooting star"),
            CandlePattern::EngulfingBullish => write!(f, "bullish engulfing"),
            CandlePattern::EngulfingBearish => write!(f, "bearish engulfing"),
            CandlePattern::Doji => write!(f, "doji"),
            CandlePattern::None => write!(f, "no clear pattern"),
        }
    }
}

/// A recent candle that came back to a level and held on one side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retest {
    pub level: f64,
    pub kind: LevelKind,
    pub candles_ago: usize,
    pub candle_time: DateTime<Utc>,
    pub pattern: CandlePattern,
    pub bounce_probability: f64,
    pub price_at_retest: f64,
    pub description: String,
}

/// Classify a candle, using the previous one for engulfing patterns.
///
/// Precedence: pin bar, hammer, shooting star, doji, engulfing.
pub fn detect_pattern(candle: &Candle, previous: Option<&Candle>) -> CandlePattern {
    let range = candle.range();
    if range == 0.0 {
        return CandlePattern::Doji;
    }
    let body = candle.body();
    let upper = candle.upper_wick();
    let lower = candle.lower_wick();

    if body / range < 0.33 && (lower > body * 2.0 || upper > body * 2.0) {
        if lower > upper * 2.0 {
            return CandlePattern::PinBarBullish;
        }
        if upper > lower * 2.0 {
            return CandlePattern::PinBarBearish;
        }
    }
    if lower > body * 2.0 && upper < body * 0.5 {
        return CandlePattern::Hammer;
    }
    if upper > body * 2.0 && lower < body * 0.5 {
        return CandlePattern::ShootingStar;
    }
    if body < range * 0.1 {
        return CandlePattern::Doji;
    }

    if let Some(prev) = previous {
        if candle.is_bullish() && prev.is_bearish() && candle.open <= prev.close && candle.close >= prev.open {
            return CandlePattern::EngulfingBullish;
        }
        if candle.is_bearish() && prev.is_bullish() && candle.open >= prev.close && candle.close <= prev.open {
            return CandlePattern::EngulfingBearish;
        }
    }
    CandlePattern::None
}

/// Heuristic bounce probability in [0, 1] for a touch of a level.
/// `distance_percent` is the signed distance of price from the level.
pub fn bounce_probability(kind: LevelKind, pattern: CandlePattern, distance_percent: f64, level_strength: f64) -> f64 {
    let mut probability = 0.5 + pattern.bounce_boost();
    probability += level_strength * 0.2;
    if distance_percent.abs() < 0.1 {
        probability += 0.1;
    }

    let (coherent, contrary) = match kind {
        LevelKind::Support => (pattern.is_bullish_reversal(), pattern.is_bearish_reversal()),
        LevelKind::Resistance => (pattern.is_bearish_reversal(), pattern.is_bullish_reversal()),
        LevelKind::Both => (false, false),
    };
    if coherent {
        probability += 0.1;
    } else if contrary {
        probability -= 0.1;
    }
    probability.clamp(0.0, 1.0)
}

fn describe_retest(level: f64, kind: LevelKind, pattern: CandlePattern, probability: f64) -> String {
    let kind_text = match kind {
        LevelKind::Resistance => "Resistance",
        _ => "Support",
    };
    format!(
        "{} retest at {:.0} with {}. Bounce probability: {}%",
        kind_text,
        level,
        pattern,
        (probability * 100.0).round() as i64
    )
}

/// Retests of `levels` within the last `lookback` candles. A touch within
/// `tolerance` points that closes above the level is a support retest, one
/// that closes below is a resistance retest.
pub fn detect_retests(candles: &[Candle], levels: &[f64], lookback: usize, tolerance: f64) -> Vec<Retest> {
    let mut retests = Vec::new();
    if candles.is_empty() || levels.is_empty() {
        return retests;
    }
    let recent = &candles[candles.len().saturating_sub(lookback)..];

    for &level in levels {
        if level == 0.0 {
            continue;
        }
        for (i, candle) in recent.iter().enumerate() {
            let touched = candle.low - tolerance <= level && level <= candle.high + tolerance;
            if !touched {
                continue;
            }
            let kind = if candle.close > level && candle.low <= level + tolerance {
                LevelKind::Support
            } else if candle.close < level && candle.high >= level - tolerance {
                LevelKind::Resistance
            } else {
                continue;
            };

            let previous = i.checked_sub(1).map(|p| &recent[p]);
            let pattern = detect_pattern(candle, previous);
            let distance_percent = (candle.close - level) / level * 100.0;
            let probability = bounce_probability(kind, pattern, distance_percent, DEFAULT_RETEST_LEVEL_STRENGTH);

            retests.push(Retest {
                level,
                kind,
                candles_ago: recent.len() - 1 - i,
                candle_time: candle.timestamp,
                pattern,
                bounce_probability: round2(probability),
                price_at_retest: round2(candle.close),
                description: describe_retest(level, kind, pattern, probability),
            });
        }
    }
    retests
}
