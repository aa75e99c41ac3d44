//! Reaction history at psychological levels
//!
//! A reaction is one bounce or break of a level, enriched with the session it
//! happened in, how far price travelled afterwards, the volatility regime at
//! the time and whether follow-through candles confirmed it.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::candles::{round2, Candle};
use super::indicators::{atr, VolatilityLevel};
use super::sessions::TradingSession;
use crate::error::AnalysisError;

/// Candles after the touch used to measure magnitude (touch included)
const MAGNITUDE_WINDOW: usize = 4;

/// Follow-through candles inspected for confirmation
const CONFIRMATION_WINDOW: usize = 5;

/// Consecutive same-direction candles needed to confirm
const CONFIRMATION_MIN_CANDLES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionType {
    Bounce,
    Break,
    /// Touched but neither bounced nor broke; never recorded in history
    Ignore,
}

impl std::fmt::Display for ReactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReactionType::Bounce => write!(f, "Bounce"),
            ReactionType::Break => write!(f, "Break"),
            ReactionType::Ignore => write!(f, "Ignore"),
        }
    }
}

/// One recorded touch of a level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub timestamp: DateTime<Utc>,
    /// Close of the reaction candle
    pub price: f64,
    #[serde(rename = "type")]
    pub kind: ReactionType,
    pub session: TradingSession,
    pub magnitude_points: f64,
    pub magnitude_percent: f64,
    pub volatility: VolatilityLevel,
    /// ATR at the reaction candle, absent when it could not be measured
    pub atr_value: Option<f64>,
    pub was_confirmed: bool,
    pub candles_in_direction: u32,
    pub distance_from_level: f64,
    pub explanation: String,
}

/// Count consecutive candles after `start` moving in the expected direction.
/// Confirmed once three in a row follow through.
pub fn detect_confirmation(candles: &[Candle], start: usize, upward: bool) -> (bool, u32) {
    let mut count = 0u32;
    for candle in candles.iter().skip(start + 1).take(CONFIRMATION_WINDOW) {
        let follows = if upward {
            candle.is_bullish()
        } else {
            candle.is_bearish()
        };
        if !follows {
            break;
        }
        count += 1;
    }
    (count >= CONFIRMATION_MIN_CANDLES, count)
}

/// Points travelled away from the level over the next few candles. Falls
/// back to the close's distance when too few candles follow.
fn reaction_magnitude(level: f64, candles: &[Candle], index: usize, moves_up: bool) -> f64 {
    let price = candles[index].close;
    if index + MAGNITUDE_WINDOW > candles.len() {
        return (price - level).abs();
    }
    let window = &candles[index..index + MAGNITUDE_WINDOW];
    if moves_up {
        window.iter().map(|c| c.high).fold(f64::MIN, f64::max) - level
    } else {
        level - window.iter().map(|c| c.low).fold(f64::MAX, f64::min)
    }
}

/// "Bounce in London, magnitude 12 pts, normal volatility, confirmed"
pub fn explain_reaction(
    kind: ReactionType,
    session: TradingSession,
    volatility: VolatilityLevel,
    magnitude: f64,
    confirmed: bool,
) -> String {
    format!(
        "{} in {}, magnitude {:.0} pts, {} volatility, {}",
        kind,
        session,
        magnitude,
        volatility,
        if confirmed { "confirmed" } else { "unconfirmed" }
    )
}

/// Build the reaction record for the candle at `index`. Returns `None` for
/// an out-of-range index or an `Ignore` touch.
pub fn build_reaction(
    level: f64,
    candles: &[Candle],
    index: usize,
    kind: ReactionType,
    atr_period: usize,
) -> Result<Option<Reaction>, AnalysisError> {
    if index >= candles.len() || kind == ReactionType::Ignore || level == 0.0 {
        return Ok(None);
    }

    let candle = &candles[index];
    let price = candle.close;
    let atr_value = atr(&candles[..=index], atr_period)?;
    let volatility = VolatilityLevel::from_atr_percent(atr_value, price);
    let session = TradingSession::from_reaction_hour(candle.timestamp.hour());

    // A bounce leaves on the side it closed; a break leaves away from the open
    let moves_up = match kind {
        ReactionType::Bounce => price > level,
        _ => candle.open < level,
    };
    let magnitude_points = reaction_magnitude(level, candles, index, moves_up);
    let magnitude_percent = magnitude_points / level * 100.0;
    let (was_confirmed, candles_in_direction) = detect_confirmation(candles, index, moves_up);

    Ok(Some(Reaction {
        timestamp: candle.timestamp,
        price,
        kind,
        session,
        magnitude_points: round2(magnitude_points),
        magnitude_percent: round2(magnitude_percent),
        volatility,
        atr_value: (atr_value > 0.0).then(|| round2(atr_value)),
        was_confirmed,
        candles_in_direction,
        distance_from_level: round2((price - level).abs()),
        explanation: explain_reaction(kind, session, volatility, magnitude_points, was_confirmed),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::candles::test_support::candle;

    #[test]
    fn test_confirmation_needs_three_consecutive() {
        let candles = vec![
            candle(0, 100.0, 101.0, 99.0, 100.0),
            candle(1, 100.0, 102.0, 99.0, 101.0),
            candle(2, 101.0, 103.0, 100.0, 102.0),
            candle(3, 102.0, 104.0, 101.0, 103.0),
            candle(4, 103.0, 104.0, 101.0, 102.0),
        ];
        assert_eq!(detect_confirmation(&candles, 0, true), (true, 3));
        assert_eq!(detect_confirmation(&candles, 0, false), (false, 0));
        assert_eq!(detect_confirmation(&candles, 4, true), (false, 0));
    }

    #[test]
    fn test_rejection_from_below_measures_low() {
        // hour 9 is London in the reaction session map
        let candles = vec![
            candle(9, 4495.0, 4500.5, 4490.0, 4494.0),
            candle(10, 4494.0, 4496.0, 4480.0, 4482.0),
            candle(11, 4482.0, 4490.0, 4475.0, 4478.0),
            candle(12, 4478.0, 4485.0, 4470.0, 4472.0),
        ];
        let reaction = build_reaction(4500.0, &candles, 0, ReactionType::Bounce, 14)
            .unwrap()
            .unwrap();
        assert_eq!(reaction.session, TradingSession::London);
        // rejected from below: level minus the lowest low of the window
        assert_eq!(reaction.magnitude_points, 30.0);
        assert!(reaction.was_confirmed);
        assert_eq!(reaction.candles_in_direction, 3);
        assert_eq!(reaction.distance_from_level, 6.0);
        assert_eq!(reaction.atr_value, None);
        assert!(reaction.explanation.starts_with("Bounce in London"));
    }

    #[test]
    fn test_short_tail_uses_close_distance() {
        let candles = vec![
            candle(14, 4490.0, 4512.0, 4488.0, 4510.0),
            candle(15, 4510.0, 4520.0, 4505.0, 4515.0),
        ];
        let reaction = build_reaction(4500.0, &candles, 1, ReactionType::Break, 14)
            .unwrap()
            .unwrap();
        assert_eq!(reaction.magnitude_points, 15.0);
        assert_eq!(reaction.session, TradingSession::NewYork);
        assert!(reaction.atr_value.is_some());
    }

    #[test]
    fn test_ignore_and_out_of_range_skipped() {
        let candles = vec![candle(0, 1.0, 2.0, 0.5, 1.5)];
        assert!(build_reaction(1.0, &candles, 0, ReactionType::Ignore, 14).unwrap().is_none());
        assert!(build_reaction(1.0, &candles, 3, ReactionType::Bounce, 14).unwrap().is_none());
    }
}
