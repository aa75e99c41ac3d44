//! Level Engine
//!
//! Round-number ("psychological") levels around a price, their touch history
//! and strength, and the breaks of those levels inside a trading session.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candles::{round2, round_to, Candle};
use super::reactions::{build_reaction, Reaction, ReactionType};
use crate::config::LevelConfig;
use crate::error::{ensure_distance, ensure_price, AnalysisError};

/// Largest search distance (points) accepted around a price
pub const MAX_LEVEL_DISTANCE: f64 = 5000.0;

/// Cap on levels enumerated in one call: every fifty across the widest distance
const MAX_ROUND_LEVELS: usize = 201;

/// Above this f64 can no longer step a 50-point grid exactly
const MAX_LEVEL_PRICE: f64 = 1e15;

/// Margin (points) around a session's range searched for broken levels
const SESSION_BREAK_MARGIN: f64 = 100.0;

/// Candles after the break candle checked for confirmation
const BREAK_CONFIRMATION_CANDLES: usize = 3;

/// Side of the current price a level sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    Support,
    Resistance,
    /// Level sits exactly at the current price
    Both,
}

impl LevelKind {
    pub fn for_price(level: f64, current_price: f64) -> Self {
        if level < current_price {
            LevelKind::Support
        } else if level > current_price {
            LevelKind::Resistance
        } else {
            LevelKind::Both
        }
    }

    pub fn acts_as_support(&self) -> bool {
        matches!(self, LevelKind::Support | LevelKind::Both)
    }

    pub fn acts_as_resistance(&self) -> bool {
        matches!(self, LevelKind::Resistance | LevelKind::Both)
    }
}

impl std::fmt::Display for LevelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelKind::Support => write!(f, "support"),
            LevelKind::Resistance => write!(f, "resistance"),
            LevelKind::Both => write!(f, "support/resistance"),
        }
    }
}

/// A round level analysed against a candle history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub kind: LevelKind,
    /// Signed `price - current_price`
    pub distance_points: f64,
    pub distance_percent: f64,
    pub strength: f64,
    pub reaction_count: u32,
    pub bounce_count: u32,
    pub break_count: u32,
    pub last_reaction_at: Option<DateTime<Utc>>,
    pub last_reaction_type: Option<ReactionType>,
    pub is_round_hundred: bool,
    pub is_round_fifty: bool,
    pub reaction_history: Vec<Reaction>,
}

/// All analysed levels around a price plus the ones that matter most
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelMap {
    pub current_price: f64,
    pub max_distance: f64,
    pub levels: Vec<Level>,
    pub nearest_support: Option<Level>,
    pub nearest_resistance: Option<Level>,
    pub strongest_support: Option<Level>,
    pub strongest_resistance: Option<Level>,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakDirection {
    Up,
    Down,
}

impl std::fmt::Display for BreakDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakDirection::Up => write!(f, "Bullish"),
            BreakDirection::Down => write!(f, "Bearish"),
        }
    }
}

/// A psychological level crossed during a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PsychologicalBreak {
    pub level: f64,
    pub direction: BreakDirection,
    pub break_price: f64,
    pub confirmed: bool,
}

/// Index range of the multiples of 50 inside `[min_price, max_price]`
fn fifty_steps(min_price: f64, max_price: f64) -> RangeInclusive<i64> {
    let first = (min_price / 50.0).ceil() as i64;
    let last = (max_price / 50.0).floor() as i64;
    first..=last
}

/// Every positive multiple of 50 within `max_distance` of the price,
/// ascending. Odd fifties are dropped unless `include_fifties` is set.
pub fn generate_round_levels(
    current_price: f64,
    max_distance: f64,
    include_fifties: bool,
) -> Result<Vec<f64>, AnalysisError> {
    ensure_price(current_price)?;
    if current_price > MAX_LEVEL_PRICE {
        return Err(AnalysisError::InvalidPrice(current_price));
    }
    ensure_distance(max_distance, MAX_LEVEL_DISTANCE)?;

    Ok(fifty_steps(current_price - max_distance, current_price + max_distance)
        .filter(|step| *step > 0 && (include_fifties || step % 2 == 0))
        .take(MAX_ROUND_LEVELS)
        .map(|step| step as f64 * 50.0)
        .collect())
}

/// Psychological levels inside `[min_price, max_price]`, ascending. At most
/// `MAX_ROUND_LEVELS` are returned, starting from the bottom of the range.
pub fn psychological_levels_in_range(min_price: f64, max_price: f64, include_fifties: bool) -> Vec<f64> {
    fifty_steps(min_price, max_price)
        .filter(|step| include_fifties || step % 2 == 0)
        .take(MAX_ROUND_LEVELS)
        .map(|step| step as f64 * 50.0)
        .collect()
}

/// Classify how a candle interacted with a level.
///
/// `None` when the candle did not touch the level. The open gives the side
/// price approached from: closing back on that side is a bounce. A candle
/// that ends on or past the level is a break only when `next` also closes
/// on the far side; anything else is `Ignore`.
pub fn classify_touch(level: f64, candle: &Candle, next: Option<&Candle>, tolerance: f64) -> Option<ReactionType> {
    let touched = candle.low - tolerance <= level && level <= candle.high + tolerance;
    if !touched {
        return None;
    }

    let from_above = candle.open > level;
    let from_below = candle.open < level;
    if (from_above && candle.close > level) || (from_below && candle.close < level) {
        return Some(ReactionType::Bounce);
    }

    let broke = next.is_some_and(|next| (from_above && next.close < level) || (from_below && next.close > level));
    Some(if broke { ReactionType::Break } else { ReactionType::Ignore })
}

/// Bounce-driven strength in [0, 1]
pub fn level_strength(bounce_count: u32, reaction_count: u32, bounces_for_full_strength: f64) -> f64 {
    if reaction_count == 0 || bounces_for_full_strength <= 0.0 {
        return 0.0;
    }
    (bounce_count as f64 / bounces_for_full_strength).min(1.0)
}

/// A break is confirmed when at least half of the (up to three) candles after
/// the break candle close beyond the level. `candles` starts at the break
/// candle itself.
pub fn is_break_confirmed(candles: &[Candle], level: f64, direction: BreakDirection) -> bool {
    if candles.len() < 2 {
        return false;
    }
    let follow = &candles[1..candles.len().min(BREAK_CONFIRMATION_CANDLES + 1)];
    let beyond = follow
        .iter()
        .filter(|c| match direction {
            BreakDirection::Up => c.close > level,
            BreakDirection::Down => c.close < level,
        })
        .count();
    beyond as f64 >= follow.len() as f64 * 0.5
}

/// First candle index where price closed beyond `level` after having closed
/// on the other side, scanning in one direction.
fn find_break(candles: &[Candle], level: f64, tolerance: f64, direction: BreakDirection) -> Option<usize> {
    let mut armed = false;
    for (i, candle) in candles.iter().enumerate() {
        let (before, after) = match direction {
            BreakDirection::Up => (candle.close < level - tolerance, candle.close > level + tolerance),
            BreakDirection::Down => (candle.close > level + tolerance, candle.close < level - tolerance),
        };
        if before {
            armed = true;
        }
        if armed && after {
            return Some(i);
        }
    }
    None
}

/// Psychological levels broken inside a session. Upward breaks take
/// precedence; a level reports at most one break.
pub fn detect_session_breaks(candles: &[Candle], tolerance: f64) -> Vec<PsychologicalBreak> {
    if candles.is_empty() {
        return Vec::new();
    }
    let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);

    psychological_levels_in_range(low - SESSION_BREAK_MARGIN, high + SESSION_BREAK_MARGIN, true)
        .into_iter()
        .filter_map(|level| {
            let (index, direction) = find_break(candles, level, tolerance, BreakDirection::Up)
                .map(|i| (i, BreakDirection::Up))
                .or_else(|| find_break(candles, level, tolerance, BreakDirection::Down).map(|i| (i, BreakDirection::Down)))?;
            Some(PsychologicalBreak {
                level,
                direction,
                break_price: candles[index].close,
                confirmed: is_break_confirmed(&candles[index..], level, direction),
            })
        })
        .collect()
}

/// "Bullish break of 4500 (confirmed), Bearish break of 4450 (unconfirmed)"
pub fn describe_breaks(breaks: &[PsychologicalBreak]) -> String {
    breaks
        .iter()
        .map(|b| {
            format!(
                "{} break of {:.0} ({})",
                b.direction,
                b.level,
                if b.confirmed { "confirmed" } else { "unconfirmed" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Replay the candle history against one level
pub fn analyze_level(
    level: f64,
    current_price: f64,
    candles: &[Candle],
    config: &LevelConfig,
) -> Result<Level, AnalysisError> {
    ensure_price(current_price)?;

    let mut bounce_count = 0u32;
    let mut break_count = 0u32;
    let mut last_reaction: Option<(DateTime<Utc>, ReactionType)> = None;
    let mut history = Vec::new();

    for (i, candle) in candles.iter().enumerate() {
        let kind = match classify_touch(level, candle, candles.get(i + 1), config.touch_tolerance) {
            Some(kind @ (ReactionType::Bounce | ReactionType::Break)) => kind,
            _ => continue,
        };
        match kind {
            ReactionType::Bounce => bounce_count += 1,
            _ => break_count += 1,
        }
        last_reaction = Some((candle.timestamp, kind));
        if let Some(reaction) = build_reaction(level, candles, i, kind, config.atr_period)? {
            history.push(reaction);
        }
    }

    let reaction_count = bounce_count + break_count;
    let strength = level_strength(bounce_count, reaction_count, config.bounces_for_full_strength);
    let distance = level - current_price;
    let is_round_hundred = level % 100.0 == 0.0;

    Ok(Level {
        price: level,
        kind: LevelKind::for_price(level, current_price),
        distance_points: round2(distance),
        distance_percent: round_to(distance / current_price * 100.0, 4),
        strength: round2(strength),
        reaction_count,
        bounce_count,
        break_count,
        last_reaction_at: last_reaction.map(|(at, _)| at),
        last_reaction_type: last_reaction.map(|(_, kind)| kind),
        is_round_hundred,
        is_round_fifty: !is_round_hundred && level % 50.0 == 0.0,
        reaction_history: history,
    })
}

/// Closest level strictly on the wanted side of price; first wins ties
fn nearest<'a>(levels: &'a [Level], current_price: f64, below: bool) -> Option<&'a Level> {
    let mut best: Option<&Level> = None;
    for level in levels {
        let eligible = if below {
            level.kind.acts_as_support() && level.price < current_price
        } else {
            level.kind.acts_as_resistance() && level.price > current_price
        };
        if eligible && best.map_or(true, |b| level.distance_points.abs() < b.distance_points.abs()) {
            best = Some(level);
        }
    }
    best
}

fn strongest<'a>(levels: &'a [Level], accept: impl Fn(&Level) -> bool) -> Option<&'a Level> {
    let mut best: Option<&Level> = None;
    for level in levels.iter().filter(|l| accept(l)) {
        if best.map_or(true, |b| level.strength > b.strength) {
            best = Some(level);
        }
    }
    best
}

fn summarize_levels(
    current_price: f64,
    nearest_support: Option<&Level>,
    nearest_resistance: Option<&Level>,
    strongest_support: Option<&Level>,
    strongest_resistance: Option<&Level>,
) -> String {
    let mut parts = vec![format!("Current price: {:.2}.", current_price)];
    if let Some(l) = nearest_support {
        parts.push(format!(
            "Nearest support: {:.2} ({:+.2} pts, strength {:.2}).",
            l.price, l.distance_points, l.strength
        ));
    }
    if let Some(l) = nearest_resistance {
        parts.push(format!(
            "Nearest resistance: {:.2} ({:+.2} pts, strength {:.2}).",
            l.price, l.distance_points, l.strength
        ));
    }
    if let Some(l) = strongest_support.filter(|l| Some(*l) != nearest_support) {
        parts.push(format!(
            "Strongest support: {:.2} (strength {:.2}, {} bounces).",
            l.price, l.strength, l.bounce_count
        ));
    }
    if let Some(l) = strongest_resistance.filter(|l| Some(*l) != nearest_resistance) {
        parts.push(format!(
            "Strongest resistance: {:.2} (strength {:.2}, {} bounces).",
            l.price, l.strength, l.bounce_count
        ));
    }
    parts.join(" ")
}

/// Analyse every round level within `max_distance` of the current price
pub fn analyze_round_levels(
    current_price: f64,
    candles: &[Candle],
    max_distance: f64,
    config: &LevelConfig,
) -> Result<LevelMap, AnalysisError> {
    let levels = generate_round_levels(current_price, max_distance, config.include_fifties)?
        .into_iter()
        .map(|level| analyze_level(level, current_price, candles, config))
        .collect::<Result<Vec<_>, _>>()?;

    let nearest_support = nearest(&levels, current_price, true);
    let nearest_resistance = nearest(&levels, current_price, false);
    let strongest_support = strongest(&levels, |l| l.kind.acts_as_support());
    let strongest_resistance = strongest(&levels, |l| l.kind.acts_as_resistance());
    let summary = summarize_levels(
        current_price,
        nearest_support,
        nearest_resistance,
        strongest_support,
        strongest_resistance,
    );

    Ok(LevelMap {
        current_price,
        max_distance,
        nearest_support: nearest_support.cloned(),
        nearest_resistance: nearest_resistance.cloned(),
        strongest_support: strongest_support.cloned(),
        strongest_resistance: strongest_resistance.cloned(),
        summary,
        levels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::candles::test_support::{candle, from_closes};

    #[test]
    fn test_round_levels_around_4510() {
        let levels = generate_round_levels(4510.0, 100.0, true).unwrap();
        assert_eq!(levels, vec![4450.0, 4500.0, 4550.0, 4600.0]);
        assert!(!levels.contains(&4700.0));
        assert!(!levels.contains(&4400.0));

        let hundreds = generate_round_levels(4510.0, 100.0, false).unwrap();
        assert_eq!(hundreds, vec![4500.0, 4600.0]);
    }

    #[test]
    fn test_round_levels_reject_bad_price() {
        assert!(generate_round_levels(0.0, 100.0, true).is_err());
        assert_eq!(
            generate_round_levels(1e20, 100.0, true),
            Err(AnalysisError::InvalidPrice(1e20))
        );
    }

    #[test]
    fn test_round_levels_reject_bad_distance() {
        for distance in [-1.0, f64::NAN, f64::INFINITY, 1e8] {
            assert!(matches!(
                generate_round_levels(4510.0, distance, true),
                Err(AnalysisError::InvalidDistance { .. })
            ));
        }
        assert_eq!(generate_round_levels(4510.0, 0.0, true).unwrap(), Vec::<f64>::new());
        assert_eq!(generate_round_levels(4500.0, 0.0, true).unwrap(), vec![4500.0]);
    }

    #[test]
    fn test_round_levels_bounded_at_max_distance() {
        let levels = generate_round_levels(4510.0, MAX_LEVEL_DISTANCE, true).unwrap();
        // 4510 - 5000 is negative, so the grid starts at 50
        assert_eq!(levels.first(), Some(&50.0));
        assert_eq!(levels.last(), Some(&9500.0));
        assert_eq!(levels.len(), 190);
        assert!(levels.windows(2).all(|w| w[1] - w[0] == 50.0));
    }

    #[test]
    fn test_levels_in_range() {
        assert_eq!(
            psychological_levels_in_range(4420.0, 4610.0, true),
            vec![4450.0, 4500.0, 4550.0, 4600.0]
        );
        assert_eq!(psychological_levels_in_range(4420.0, 4610.0, false), vec![4500.0, 4600.0]);

        let wide = psychological_levels_in_range(0.0, 1e20, true);
        assert_eq!(wide.len(), MAX_ROUND_LEVELS);
        assert_eq!(wide[0], 0.0);
    }

    #[test]
    fn test_classify_touch() {
        let dip = candle(0, 4505.0, 4508.0, 4499.8, 4506.0);
        assert_eq!(classify_touch(4500.0, &dip, None, 0.5), Some(ReactionType::Bounce));

        let rejected = candle(0, 4494.0, 4500.3, 4490.0, 4492.0);
        assert_eq!(classify_touch(4500.0, &rejected, None, 0.5), Some(ReactionType::Bounce));

        let far = candle(0, 4520.0, 4530.0, 4510.0, 4525.0);
        assert_eq!(classify_touch(4500.0, &far, None, 0.5), None);
    }

    #[test]
    fn test_classify_touch_break_needs_next_close() {
        let crossing = candle(0, 4505.0, 4506.0, 4494.0, 4497.0);
        let next_below = candle(1, 4497.0, 4499.0, 4488.0, 4490.0);
        let next_back = candle(1, 4497.0, 4506.0, 4496.0, 4503.0);
        assert_eq!(classify_touch(4500.0, &crossing, Some(&next_below), 0.5), Some(ReactionType::Break));
        assert_eq!(classify_touch(4500.0, &crossing, Some(&next_back), 0.5), Some(ReactionType::Ignore));
        assert_eq!(classify_touch(4500.0, &crossing, None, 0.5), Some(ReactionType::Ignore));

        // closing exactly on the level still needs the next candle beyond it
        let at_level = candle(0, 4495.0, 4502.0, 4494.0, 4500.0);
        let next_above = candle(1, 4500.0, 4510.0, 4499.0, 4508.0);
        assert_eq!(classify_touch(4500.0, &at_level, Some(&next_above), 0.5), Some(ReactionType::Break));
    }

    #[test]
    fn test_level_strength_bounds() {
        assert_eq!(level_strength(0, 0, 5.0), 0.0);
        assert_eq!(level_strength(0, 2, 5.0), 0.0);
        assert_eq!(level_strength(3, 3, 5.0), 0.6);
        assert_eq!(level_strength(9, 9, 5.0), 1.0);
    }

    #[test]
    fn test_break_confirmation() {
        let candles = from_closes(&[4505.0, 4510.0, 4495.0, 4512.0]);
        assert!(is_break_confirmed(&candles, 4500.0, BreakDirection::Up));
        assert!(!is_break_confirmed(&candles, 4500.0, BreakDirection::Down));
        assert!(!is_break_confirmed(&candles[..1], 4500.0, BreakDirection::Up));
    }

    #[test]
    fn test_session_break_upward() {
        let candles = from_closes(&[4490.0, 4492.0, 4508.0, 4512.0, 4515.0]);
        let breaks = detect_session_breaks(&candles, 5.0);
        let at_4500: Vec<_> = breaks.iter().filter(|b| b.level == 4500.0).collect();
        assert_eq!(at_4500.len(), 1);
        assert_eq!(at_4500[0].direction, BreakDirection::Up);
        assert_eq!(at_4500[0].break_price, 4508.0);
        assert!(at_4500[0].confirmed);
        assert!(describe_breaks(&breaks).contains("Bullish break of 4500 (confirmed)"));
    }

    #[test]
    fn test_analyze_level_counts_bounces() {
        let candles = vec![
            candle(0, 4506.0, 4508.0, 4500.2, 4505.0),
            candle(1, 4505.0, 4512.0, 4504.0, 4510.0),
            candle(2, 4510.0, 4511.0, 4499.9, 4503.0),
            candle(3, 4503.0, 4515.0, 4502.0, 4514.0),
        ];
        let level = analyze_level(4500.0, 4514.0, &candles, &LevelConfig::default()).unwrap();
        assert_eq!(level.kind, LevelKind::Support);
        assert_eq!(level.bounce_count, 2);
        assert_eq!(level.break_count, 0);
        assert_eq!(level.strength, 0.4);
        assert_eq!(level.distance_points, -14.0);
        assert_eq!(level.reaction_history.len(), 2);
        assert_eq!(level.last_reaction_type, Some(ReactionType::Bounce));
        assert!(level.is_round_hundred);
        assert!(!level.is_round_fifty);
    }

    #[test]
    fn test_level_map_nearest_and_strongest() {
        let candles = vec![
            candle(0, 4456.0, 4458.0, 4450.1, 4455.0),
            candle(1, 4455.0, 4470.0, 4449.8, 4468.0),
            candle(2, 4468.0, 4505.0, 4466.0, 4502.0),
            candle(3, 4502.0, 4508.0, 4500.3, 4506.0),
        ];
        let map = analyze_round_levels(4506.0, &candles, 100.0, &LevelConfig::default()).unwrap();
        assert_eq!(map.nearest_support.as_ref().map(|l| l.price), Some(4500.0));
        assert_eq!(map.nearest_resistance.as_ref().map(|l| l.price), Some(4550.0));
        assert_eq!(map.strongest_support.as_ref().map(|l| l.price), Some(4450.0));
        assert_eq!(map.nearest_support.as_ref().map(|l| l.break_count), Some(1));
        assert!(map.summary.starts_with("Current price: 4506.00."));
        assert!(map.summary.contains("Strongest support: 4450.00"));
    }
}
