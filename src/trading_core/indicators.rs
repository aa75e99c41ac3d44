//! Indicator Engine
//!
//! RSI, ATR, EMA, trend structure, impulse strength and swing-based
//! support/resistance over a chronologically sorted candle slice.
//!
//! Not having enough candles is never an error: every indicator returns
//! `None` (or its documented neutral value) in that case. Only a zero
//! period or lookback is rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::candles::{round2, Candle, TrendDirection};
use crate::error::{ensure_period, AnalysisError};

/// RSI values the H4 playbook watches for pullback entries
pub const DEFAULT_RSI_ZONES: [f64; 3] = [55.0, 50.0, 45.0];

/// Maximum RSI distance (points) to count as "in" a zone
const RSI_ZONE_TOLERANCE: f64 = 2.0;

/// Minimum net move (%) for a window to count as trending
const TREND_THRESHOLD_PERCENT: f64 = 0.5;

/// Impulse is "strong" above this move (%)
const STRONG_IMPULSE_PERCENT: f64 = 0.3;

/// Support/resistance needs at least this many candles
const MIN_SR_CANDLES: usize = 10;

/// Volatility bucket shared by reactions and session summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityLevel {
    Low,
    Normal,
    High,
    Extreme,
}

impl std::fmt::Display for VolatilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolatilityLevel::Low => write!(f, "low"),
            VolatilityLevel::Normal => write!(f, "normal"),
            VolatilityLevel::High => write!(f, "high"),
            VolatilityLevel::Extreme => write!(f, "extreme"),
        }
    }
}

impl VolatilityLevel {
    /// Bucket from ATR as a percent of price (0.3 / 0.6 / 1.0)
    pub fn from_atr_percent(atr: f64, price: f64) -> Self {
        if price <= 0.0 {
            return VolatilityLevel::Normal;
        }
        let atr_percent = atr / price * 100.0;
        if atr_percent < 0.3 {
            VolatilityLevel::Low
        } else if atr_percent < 0.6 {
            VolatilityLevel::Normal
        } else if atr_percent < 1.0 {
            VolatilityLevel::High
        } else {
            VolatilityLevel::Extreme
        }
    }

    /// Bucket from current ATR relative to a historical ATR
    pub fn from_atr_ratio(atr: f64, historical_atr: f64) -> Self {
        if historical_atr == 0.0 {
            return VolatilityLevel::Normal;
        }
        let ratio = atr / historical_atr;
        if ratio >= 1.5 {
            VolatilityLevel::Extreme
        } else if ratio >= 1.2 {
            VolatilityLevel::High
        } else if ratio >= 0.8 {
            VolatilityLevel::Normal
        } else {
            VolatilityLevel::Low
        }
    }
}

/// Last-close impulse relative to a close `lookback` candles earlier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Impulse {
    pub direction: TrendDirection,
    /// Absolute move in percent of the reference close, 2dp
    pub distance_percent: f64,
    pub is_strong: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupportResistance {
    pub support: f64,
    pub resistance: f64,
}

/// ATR and range summary for one trading session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilitySummary {
    pub atr: f64,
    pub range_percent: f64,
    pub level: VolatilityLevel,
    pub description: String,
    /// "<ratio>% vs <period>-candle average" when history was available
    pub vs_historical: Option<String>,
}

/// Relative Strength Index with simple averages over the last `period` deltas
pub fn rsi(candles: &[Candle], period: usize) -> Result<Option<f64>, AnalysisError> {
    ensure_period("rsi period", period)?;
    if candles.len() < period + 1 {
        return Ok(None);
    }

    let window = &candles[candles.len() - period - 1..];
    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in window.windows(2) {
        let change = pair[1].close - pair[0].close;
        if change > 0.0 {
            gains += change;
        } else {
            losses += -change;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Ok(Some(100.0));
    }

    let rs = avg_gain / avg_loss;
    Ok(Some(round2(100.0 - 100.0 / (1.0 + rs))))
}

/// True range of every candle after the first
fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|pair| {
            let prev_close = pair[0].close;
            let bar = &pair[1];
            (bar.high - bar.low)
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs())
        })
        .collect()
}

/// Average True Range: mean of the last `period` true ranges, or of all of
/// them when fewer exist. Zero below two candles.
pub fn atr(candles: &[Candle], period: usize) -> Result<f64, AnalysisError> {
    ensure_period("atr period", period)?;
    let trs = true_ranges(candles);
    if trs.is_empty() {
        return Ok(0.0);
    }
    let take = period.min(trs.len());
    let recent = &trs[trs.len() - take..];
    Ok(recent.iter().sum::<f64>() / take as f64)
}

/// Exponential moving averages keyed by period. Periods longer than the
/// series are left out of the map.
pub fn ema(candles: &[Candle], periods: &[usize]) -> Result<BTreeMap<usize, f64>, AnalysisError> {
    let mut out = BTreeMap::new();
    for &period in periods {
        ensure_period("ema period", period)?;
        if candles.len() < period {
            continue;
        }
        let k = 2.0 / (period as f64 + 1.0);
        let seed = candles[..period].iter().map(|c| c.close).sum::<f64>() / period as f64;
        let value = candles[period..]
            .iter()
            .fold(seed, |prev, c| c.close * k + prev * (1.0 - k));
        out.insert(period, value);
    }
    Ok(out)
}

/// Swing-structure trend over the last `lookback` candles
pub fn identify_trend(candles: &[Candle], lookback: usize) -> Result<TrendDirection, AnalysisError> {
    ensure_period("trend lookback", lookback)?;
    let lookback = lookback.min(candles.len());
    if lookback < 2 {
        return Ok(TrendDirection::Neutral);
    }

    let recent = &candles[candles.len() - lookback..];
    let (mut higher_highs, mut lower_highs, mut higher_lows, mut lower_lows) = (0u32, 0u32, 0u32, 0u32);
    for pair in recent.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        if curr.high > prev.high {
            higher_highs += 1;
        }
        if curr.high < prev.high {
            lower_highs += 1;
        }
        if curr.low > prev.low {
            higher_lows += 1;
        }
        if curr.low < prev.low {
            lower_lows += 1;
        }
    }

    let first_close = recent[0].close;
    let last_close = recent[recent.len() - 1].close;
    if first_close == 0.0 {
        return Ok(TrendDirection::Neutral);
    }
    let change_percent = (last_close - first_close) / first_close * 100.0;

    let trend = if higher_highs > lower_highs
        && higher_lows > lower_lows
        && change_percent > TREND_THRESHOLD_PERCENT
    {
        TrendDirection::Bullish
    } else if lower_lows > higher_lows
        && lower_highs > higher_highs
        && change_percent < -TREND_THRESHOLD_PERCENT
    {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    };
    Ok(trend)
}

/// Move between the last close and the close `lookback` candles before it
pub fn impulse_strength(candles: &[Candle], lookback: usize) -> Result<Option<Impulse>, AnalysisError> {
    ensure_period("impulse lookback", lookback)?;
    if candles.len() < lookback + 1 {
        return Ok(None);
    }

    let last = candles[candles.len() - 1].close;
    let reference = candles[candles.len() - 1 - lookback].close;
    let distance_percent = if reference > 0.0 {
        (last - reference).abs() / reference * 100.0
    } else {
        0.0
    };
    let direction = if last > reference {
        TrendDirection::Bullish
    } else if last < reference {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    };

    Ok(Some(Impulse {
        direction,
        distance_percent: round2(distance_percent),
        is_strong: distance_percent > STRONG_IMPULSE_PERCENT,
    }))
}

/// Support as the mean of the three lowest swing lows and resistance as the
/// mean of the three highest swing highs inside the lookback window.
pub fn find_support_resistance(
    candles: &[Candle],
    lookback: usize,
) -> Result<Option<SupportResistance>, AnalysisError> {
    ensure_period("support/resistance lookback", lookback)?;
    if candles.len() < MIN_SR_CANDLES {
        return Ok(None);
    }

    let window = &candles[candles.len().saturating_sub(lookback)..];
    let mut swing_highs = Vec::new();
    let mut swing_lows = Vec::new();
    for triple in window.windows(3) {
        let (prev, curr, next) = (&triple[0], &triple[1], &triple[2]);
        if curr.high > prev.high && curr.high > next.high {
            swing_highs.push(curr.high);
        }
        if curr.low < prev.low && curr.low < next.low {
            swing_lows.push(curr.low);
        }
    }

    if swing_highs.is_empty() {
        swing_highs.push(window.iter().map(|c| c.high).fold(f64::MIN, f64::max));
    }
    if swing_lows.is_empty() {
        swing_lows.push(window.iter().map(|c| c.low).fold(f64::MAX, f64::min));
    }

    swing_highs.sort_by(|a, b| b.total_cmp(a));
    swing_lows.sort_by(|a, b| a.total_cmp(b));
    let top: Vec<f64> = swing_highs.into_iter().take(3).collect();
    let bottom: Vec<f64> = swing_lows.into_iter().take(3).collect();

    Ok(Some(SupportResistance {
        support: round2(bottom.iter().sum::<f64>() / bottom.len() as f64),
        resistance: round2(top.iter().sum::<f64>() / top.len() as f64),
    }))
}

pub fn is_near_level(price: f64, level: f64, threshold_percent: f64) -> bool {
    if level == 0.0 {
        return false;
    }
    ((price - level) / level).abs() * 100.0 <= threshold_percent
}

/// Nearest RSI target within two points, first target wins ties
pub fn rsi_zone(rsi: Option<f64>, targets: &[f64]) -> Option<f64> {
    let rsi = rsi?;
    let mut best: Option<(f64, f64)> = None;
    for &target in targets {
        let distance = (rsi - target).abs();
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((target, distance));
        }
    }
    best.filter(|(_, d)| *d <= RSI_ZONE_TOLERANCE).map(|(t, _)| t)
}

/// Volatility of a session's candles, optionally compared against history
pub fn session_volatility(
    session: &[Candle],
    historical: Option<&[Candle]>,
    period: usize,
) -> Result<VolatilitySummary, AnalysisError> {
    ensure_period("volatility period", period)?;
    if session.is_empty() {
        return Ok(VolatilitySummary {
            atr: 0.0,
            range_percent: 0.0,
            level: VolatilityLevel::Normal,
            description: "No candles to measure volatility".to_string(),
            vs_historical: None,
        });
    }

    let session_atr = round2(atr(session, period.min(session.len()))?);
    let high = session.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = session.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let avg_close = session.iter().map(|c| c.close).sum::<f64>() / session.len() as f64;
    let range_percent = if avg_close == 0.0 {
        0.0
    } else {
        round2((high - low) / avg_close * 100.0)
    };

    let mut level = VolatilityLevel::Normal;
    let mut vs_historical = None;
    if let Some(history) = historical.filter(|h| h.len() >= period) {
        let historical_atr = round2(atr(history, period)?);
        level = VolatilityLevel::from_atr_ratio(session_atr, historical_atr);
        if historical_atr > 0.0 {
            vs_historical = Some(format!(
                "{:.0}% vs {}-candle average",
                session_atr / historical_atr * 100.0,
                period
            ));
        }
    }

    let mut description = format!("ATR: {:.2}, range: {:.2}% of price", session_atr, range_percent);
    if let Some(text) = &vs_historical {
        description.push_str(&format!(" ({})", text));
    }

    Ok(VolatilitySummary {
        atr: session_atr,
        range_percent,
        level,
        description,
        vs_historical,
    })
}
