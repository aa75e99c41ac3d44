//! Recommendation Synthesizer
//!
//! Folds the daily review, the DXY/bond alignment, the trading mode and the
//! per-timeframe technicals into one trade idea: direction, entry, stop,
//! targets, risk/reward and a confidence breakdown.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::alignment::{AlignmentAnalysis, AlignmentStatus, MarketBias};
use super::candles::{round2, Timeframe, TrendDirection};
use super::events::HighImpactNews;
use super::indicators::Impulse;
use super::sessions::DailyAnalysis;
use super::technical::MultiTimeframeAnalysis;
use super::trading_mode::{TradingMode, TradingModeRecommendation};
use crate::config::AdvisorSettings;

/// Ratio a trade needs to be worth taking
pub const MINIMUM_RISK_REWARD_RATIO: f64 = 1.5;

pub const DISCLAIMER: &str = "IMPORTANT: THIS IS NOT FINANCIAL ADVICE. PROBABILISTIC ANALYSIS ONLY.\n\
This recommendation is informational and educational. It is not financial, investment or trading advice.\n\
Trading financial instruments carries a high level of risk and you can lose all of your capital. \
Past results do not guarantee future results and probabilities are not certainties.\n\
You alone are responsible for your trading decisions. Consult a licensed financial adviser before trading \
and only trade with capital you can afford to lose.\n\
This information is provided as is, without warranties of any kind.";

/// Confidence when the mode says to stand aside
const STAND_ASIDE_CONFIDENCE: f64 = 0.7;
const WAIT_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Buy,
    Sell,
    Wait,
}

impl TradeDirection {
    fn matches_trend(&self, trend: TrendDirection) -> bool {
        matches!(
            (self, trend),
            (TradeDirection::Buy, TrendDirection::Bullish) | (TradeDirection::Sell, TrendDirection::Bearish)
        )
    }
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeDirection::Buy => write!(f, "BUY"),
            TradeDirection::Sell => write!(f, "SELL"),
            TradeDirection::Wait => write!(f, "WAIT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevels {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit_1: f64,
    pub take_profit_2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRewardDetails {
    /// "1:2.50"
    pub ratio: String,
    pub ratio_value: f64,
    pub risk_points: f64,
    pub reward_points: f64,
    pub risk_percent: f64,
    pub reward_percent: f64,
    pub meets_minimum: bool,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub technical: f64,
    pub market: f64,
    pub news: f64,
    pub overall: f64,
}

impl ConfidenceBreakdown {
    /// Clamp each component to [0, 1]; overall is 0.5t + 0.3m + 0.2n
    pub fn new(technical: f64, market: f64, news: f64) -> Self {
        let technical = technical.clamp(0.0, 1.0);
        let market = market.clamp(0.0, 1.0);
        let news = news.clamp(0.0, 1.0);
        Self {
            technical,
            market,
            news,
            overall: 0.5 * technical + 0.3 * market + 0.2 * news,
        }
    }
}

/// The parts of the multi-timeframe picture a trader reads first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalExtract {
    pub trends: BTreeMap<Timeframe, TrendDirection>,
    pub h4_rsi: Option<f64>,
    pub h4_rsi_zone: Option<f64>,
    pub h4_impulse: Option<Impulse>,
    pub h4_ema: BTreeMap<usize, f64>,
    pub price_near_support: Option<bool>,
    pub price_near_resistance: Option<bool>,
}

impl TechnicalExtract {
    pub fn from_analysis(technical: &MultiTimeframeAnalysis) -> Self {
        let h4 = technical.get(Timeframe::H4);
        Self {
            trends: technical.trends(),
            h4_rsi: h4.and_then(|a| a.rsi),
            h4_rsi_zone: h4.and_then(|a| a.rsi_zone),
            h4_impulse: h4.and_then(|a| a.impulse),
            h4_ema: h4.map(|a| a.ema.clone()).unwrap_or_default(),
            price_near_support: h4.map(|a| a.near_support),
            price_near_resistance: h4.map(|a| a.near_resistance),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecommendation {
    pub direction: TradeDirection,
    pub confidence: f64,
    pub current_price: f64,
    pub entry: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit_1: Option<f64>,
    pub take_profit_2: Option<f64>,
    pub optimal_entry_range: Option<PriceRange>,
    pub support_level: Option<f64>,
    pub resistance_level: Option<f64>,
    /// "1:2.50", or "N/A" without price levels
    pub risk_reward_ratio: String,
    pub risk_reward_details: Option<RiskRewardDetails>,
    pub confidence_breakdown: ConfidenceBreakdown,
    pub invalidation_level: Option<f64>,
    pub trading_mode: TradingMode,
    pub market_bias: Option<MarketBias>,
    pub technical: TechnicalExtract,
    pub reasons: Vec<String>,
    pub summary: String,
    pub detailed_explanation: String,
    pub warnings: Vec<String>,
    pub disclaimer: String,
}

#[derive(Debug, Clone, Copy)]
pub struct AdvisorInputs<'a> {
    pub instrument: &'a str,
    pub current_price: f64,
    pub daily: Option<&'a DailyAnalysis>,
    pub alignment: Option<&'a AlignmentAnalysis>,
    pub mode: &'a TradingModeRecommendation,
    pub news: &'a HighImpactNews,
    pub technical: Option<&'a MultiTimeframeAnalysis>,
}

impl AdvisorInputs<'_> {
    fn daily_direction(&self) -> TrendDirection {
        self.daily.map_or(TrendDirection::Neutral, |d| d.daily_direction)
    }

    fn aligned_bias(&self) -> Option<MarketBias> {
        self.alignment
            .filter(|a| a.status == AlignmentStatus::Aligned)
            .map(|a| a.bias)
    }
}

/// Yesterday's extremes, or the session range when there is no day before.
/// Levels hugging the price are pushed out by half a percent.
pub fn support_resistance(daily: Option<&DailyAnalysis>, current_price: f64) -> (Option<f64>, Option<f64>) {
    let Some(daily) = daily else {
        return (None, None);
    };
    let (mut support, mut resistance) = match (daily.previous_day_low, daily.previous_day_high) {
        (Some(low), Some(high)) => (Some(low), Some(high)),
        _ => (daily.session_low(), daily.session_high()),
    };

    if let (Some(s), Some(r)) = (support, resistance) {
        if current_price < s * 1.01 {
            support = Some(s * 0.995);
        }
        if current_price > r * 0.99 {
            resistance = Some(r * 1.005);
        }
    }
    (support, resistance)
}

/// Where price sits between support (0) and resistance (1)
fn range_position(price: f64, support: Option<f64>, resistance: Option<f64>) -> Option<f64> {
    match (support, resistance) {
        (Some(s), Some(r)) if r > s => Some((price - s) / (r - s)),
        _ => None,
    }
}

/// Directional score in [-1, 1]; positive favours buying
pub fn direction_score(
    inputs: &AdvisorInputs<'_>,
    support: Option<f64>,
    resistance: Option<f64>,
    settings: &AdvisorSettings,
) -> f64 {
    let mut score = match inputs.daily_direction() {
        TrendDirection::Bullish => settings.daily_direction_weight,
        TrendDirection::Bearish => -settings.daily_direction_weight,
        TrendDirection::Neutral => 0.0,
    };

    // gold runs against the dollar and yields
    score += match inputs.aligned_bias() {
        Some(MarketBias::RiskOn) => settings.alignment_weight,
        Some(MarketBias::RiskOff) => -settings.alignment_weight,
        _ => 0.0,
    };

    if let Some(position) = range_position(inputs.current_price, support, resistance) {
        if position < settings.position_band {
            score += settings.position_weight;
        } else if position > 1.0 - settings.position_band {
            score -= settings.position_weight;
        }
    }

    if let Some(daily) = inputs.daily {
        score += match daily.session_balance().signum() {
            1 => settings.session_majority_weight,
            -1 => -settings.session_majority_weight,
            _ => 0.0,
        };
    }
    score.clamp(-1.0, 1.0)
}

/// Map the score to a direction and a 2dp confidence
pub fn determine_direction(mode: TradingMode, score: f64, settings: &AdvisorSettings) -> (TradeDirection, f64) {
    if mode.stands_aside() {
        return (TradeDirection::Wait, STAND_ASIDE_CONFIDENCE);
    }

    let (direction, mut confidence) = if score > settings.direction_threshold {
        (TradeDirection::Buy, (0.5 + score.abs() * 0.5).min(0.9))
    } else if score < -settings.direction_threshold {
        (TradeDirection::Sell, (0.5 + score.abs() * 0.5).min(0.9))
    } else {
        (TradeDirection::Wait, WAIT_CONFIDENCE)
    };

    match mode {
        TradingMode::Aggressive => confidence += 0.1,
        TradingMode::Calm => confidence -= 0.1,
        _ => {}
    }
    (direction, round2(confidence.clamp(0.4, 0.95)))
}

/// Entry, stop and targets for a buy or sell; `None` for wait.
/// Aggressive mode stretches the TP2 distance from entry by `aggressive_tp2_stretch`
/// and calm mode shrinks the stop distance by `calm_stop_tighten`; the prices
/// themselves are never scaled, so both stay on their side of the entry.
pub fn price_levels(
    direction: TradeDirection,
    current_price: f64,
    support: Option<f64>,
    resistance: Option<f64>,
    mode: TradingMode,
    average_range: f64,
    settings: &AdvisorSettings,
) -> Option<PriceLevels> {
    let offset = settings.entry_offset_percent / 100.0;
    let stop_buffer = settings.stop_level_buffer_percent / 100.0;
    let tp1_buffer = settings.tp1_level_buffer_percent / 100.0;
    let tp2_buffer = settings.tp2_level_buffer_percent / 100.0;
    let stop_distance = average_range * settings.stop_range_multiple;
    let tp2_distance = average_range * settings.tp2_range_multiple;

    let mut levels = match direction {
        TradeDirection::Wait => return None,
        TradeDirection::Buy => {
            let entry = current_price * (1.0 - offset);
            let by_range = entry - stop_distance;
            // a level only counts while it sits on the right side of the entry
            let below = |p: f64| (p < entry).then_some(p);
            let above = |p: f64| (p > entry).then_some(p);
            PriceLevels {
                entry,
                // nearer of the two is the higher one
                stop_loss: support
                    .and_then(|s| below(s * (1.0 - stop_buffer)))
                    .map_or(by_range, |s| s.max(by_range)),
                take_profit_1: resistance
                    .and_then(|r| above(r * (1.0 - tp1_buffer)))
                    .map_or(entry + average_range, |r| r.min(entry + average_range)),
                take_profit_2: resistance
                    .and_then(|r| above(r * (1.0 + tp2_buffer)))
                    .map_or(entry + tp2_distance, |r| r.min(entry + tp2_distance)),
            }
        }
        TradeDirection::Sell => {
            let entry = current_price * (1.0 + offset);
            let by_range = entry + stop_distance;
            let below = |p: f64| (p < entry).then_some(p);
            let above = |p: f64| (p > entry).then_some(p);
            PriceLevels {
                entry,
                stop_loss: resistance
                    .and_then(|r| above(r * (1.0 + stop_buffer)))
                    .map_or(by_range, |r| r.min(by_range)),
                take_profit_1: support
                    .and_then(|s| below(s * (1.0 + tp1_buffer)))
                    .map_or(entry - average_range, |s| s.max(entry - average_range)),
                take_profit_2: support
                    .and_then(|s| below(s * (1.0 - tp2_buffer)))
                    .map_or(entry - tp2_distance, |s| s.max(entry - tp2_distance)),
            }
        }
    };

    // mode adjustments scale the distance from entry, never the price itself
    match mode {
        TradingMode::Aggressive => {
            levels.take_profit_2 = levels.entry + (levels.take_profit_2 - levels.entry) * (1.0 + settings.aggressive_tp2_stretch)
        }
        TradingMode::Calm => {
            levels.stop_loss = levels.entry + (levels.stop_loss - levels.entry) * (1.0 - settings.calm_stop_tighten)
        }
        _ => {}
    }

    Some(PriceLevels {
        entry: round2(levels.entry),
        stop_loss: round2(levels.stop_loss),
        take_profit_1: round2(levels.take_profit_1),
        take_profit_2: round2(levels.take_profit_2),
    })
}

/// Entry +-`percent`, never crossing support on a buy or resistance on a sell.
/// A level whose buffer lies on the wrong side of the entry is ignored, so the
/// range always satisfies `min <= entry <= max`.
pub fn optimal_entry_range(
    direction: TradeDirection,
    entry: f64,
    support: Option<f64>,
    resistance: Option<f64>,
    percent: f64,
) -> Option<PriceRange> {
    let width = percent / 100.0;
    let mut min = entry * (1.0 - width);
    let mut max = entry * (1.0 + width);
    match direction {
        TradeDirection::Wait => return None,
        TradeDirection::Buy => {
            if let Some(floor) = support.map(|s| s * 0.999).filter(|f| *f <= entry) {
                min = min.max(floor);
            }
        }
        TradeDirection::Sell => {
            if let Some(ceiling) = resistance.map(|r| r * 1.001).filter(|c| *c >= entry) {
                max = max.min(ceiling);
            }
        }
    }
    Some(PriceRange {
        min: round2(min),
        max: round2(max),
    })
}

pub fn risk_reward(
    direction: TradeDirection,
    entry: f64,
    stop_loss: f64,
    take_profit: f64,
    minimum_ratio: f64,
) -> RiskRewardDetails {
    let risk_points = (entry - stop_loss).abs();
    let reward_points = (take_profit - entry).abs();
    let (risk_percent, reward_percent) = if entry != 0.0 {
        (risk_points / entry * 100.0, reward_points / entry * 100.0)
    } else {
        (0.0, 0.0)
    };
    let ratio_value = if risk_points > 0.0 { reward_points / risk_points } else { 0.0 };
    let ratio = format!("1:{:.2}", ratio_value);
    let meets_minimum = ratio_value >= minimum_ratio;

    let mut explanation = format!(
        "For this {} trade:\n• Risk: {:.2} points ({:.2}% of entry)\n• Reward: {:.2} points ({:.2}% of entry)\n• Ratio: {}\n",
        direction, risk_points, risk_percent, reward_points, reward_percent, ratio
    );
    if meets_minimum {
        explanation.push_str(&format!("• Meets the recommended minimum of 1:{:.1}", minimum_ratio));
    } else {
        explanation.push_str(&format!(
            "• Does NOT meet the recommended minimum of 1:{:.1}\n• Consider adjusting levels or waiting for a better setup",
            minimum_ratio
        ));
    }

    RiskRewardDetails {
        ratio,
        ratio_value,
        risk_points: round2(risk_points),
        reward_points: round2(reward_points),
        risk_percent: round2(risk_percent),
        reward_percent: round2(reward_percent),
        meets_minimum,
        explanation,
    }
}

/// Price beyond which the trade idea is wrong
pub fn invalidation_level(direction: TradeDirection, stop_loss: f64, buffer: f64) -> Option<f64> {
    match direction {
        TradeDirection::Buy => Some(round2(stop_loss * (1.0 - buffer))),
        TradeDirection::Sell => Some(round2(stop_loss * (1.0 + buffer))),
        TradeDirection::Wait => None,
    }
}

fn confidence_breakdown(inputs: &AdvisorInputs<'_>, direction: TradeDirection) -> ConfidenceBreakdown {
    let h4 = inputs.technical.and_then(|t| t.get(Timeframe::H4));
    let near_support = h4.is_some_and(|a| a.near_support);
    let near_resistance = h4.is_some_and(|a| a.near_resistance);

    let mut technical = 0.5;
    if direction.matches_trend(inputs.daily_direction()) {
        technical += 0.2;
    }
    if (direction == TradeDirection::Buy && near_support) || (direction == TradeDirection::Sell && near_resistance) {
        technical += 0.2;
    }

    let mut market = 0.5;
    let supports_direction = matches!(
        (inputs.aligned_bias(), direction),
        (Some(MarketBias::RiskOn), TradeDirection::Buy) | (Some(MarketBias::RiskOff), TradeDirection::Sell)
    );
    if supports_direction {
        market += 0.3;
    }
    match inputs.mode.mode {
        TradingMode::Aggressive => market += 0.1,
        TradingMode::Calm => market -= 0.1,
        _ => {}
    }

    let news = if inputs.news.has_high_impact_news { 0.5 } else { 0.9 };
    ConfidenceBreakdown::new(technical, market, news)
}

fn recommendation_reasons(
    inputs: &AdvisorInputs<'_>,
    support: Option<f64>,
    resistance: Option<f64>,
    settings: &AdvisorSettings,
) -> Vec<String> {
    let mut reasons = Vec::new();
    match inputs.daily_direction() {
        TrendDirection::Bullish => reasons.push("Previous day bullish, positive momentum".to_string()),
        TrendDirection::Bearish => reasons.push("Previous day bearish, negative momentum".to_string()),
        TrendDirection::Neutral => {}
    }
    match inputs.aligned_bias() {
        Some(MarketBias::RiskOff) => reasons.push(format!(
            "DXY and bonds aligned (risk-off) → bearish pressure on {}",
            inputs.instrument
        )),
        Some(MarketBias::RiskOn) => reasons.push(format!(
            "DXY and bonds aligned (risk-on) → bullish pressure on {}",
            inputs.instrument
        )),
        _ => {}
    }
    if let Some(position) = range_position(inputs.current_price, support, resistance) {
        if position < settings.position_band {
            reasons.push("Price near support, buying opportunity".to_string());
        } else if position > 1.0 - settings.position_band {
            reasons.push("Price near resistance, selling opportunity".to_string());
        }
    }
    match inputs.mode.mode {
        TradingMode::Aggressive => reasons.push("Aggressive mode suggested, favorable conditions".to_string()),
        TradingMode::Calm => reasons.push("Calm mode suggested, conservative trading".to_string()),
        _ => {}
    }
    reasons
}

fn warnings(inputs: &AdvisorInputs<'_>) -> Vec<String> {
    let mut warnings = Vec::new();
    if inputs.news.has_high_impact_news {
        warnings.push(format!(
            "Attention: {} high-impact USD release(s) today. Consider waiting or reducing position size.",
            inputs.news.count
        ));
    }
    if inputs.mode.mode.stands_aside() {
        warnings.push(format!(
            "{} mode active. Better to wait for cleaner conditions or reduce exposure.",
            inputs.mode.mode
        ));
    }
    if inputs.mode.confidence < 0.6 {
        warnings.push(
            "Low confidence in the recommendation. Consider waiting for clearer signals before trading.".to_string(),
        );
    }
    warnings
}

fn summary_line(direction: TradeDirection, levels: Option<&PriceLevels>) -> String {
    let mut summary = format!("Recommendation: {}", direction);
    if let Some(l) = levels {
        summary.push_str(&format!(
            " at {:.2} (SL: {:.2}) (TP1: {:.2})",
            l.entry, l.stop_loss, l.take_profit_1
        ));
    }
    summary
}

fn explain(
    direction: TradeDirection,
    inputs: &AdvisorInputs<'_>,
    levels: Option<&PriceLevels>,
    support: Option<f64>,
    resistance: Option<f64>,
    reasons: &[String],
) -> String {
    let mut parts = vec![format!("Recommendation: {}", direction)];
    if let Some(l) = levels {
        parts.push(format!("\nCurrent price: {:.2}", inputs.current_price));
        parts.push(format!("Recommended entry: {:.2}", l.entry));
        parts.push(format!("Stop loss: {:.2}", l.stop_loss));
        parts.push(format!("Take profit 1: {:.2}", l.take_profit_1));
        if let Some(s) = support {
            parts.push(format!("Support identified: {:.2}", s));
        }
        if let Some(r) = resistance {
            parts.push(format!("Resistance identified: {:.2}", r));
        }
    }
    parts.push("\nReasons:".to_string());
    parts.extend(reasons.iter().map(|r| format!("• {}", r)));
    parts.push(format!("\nTrading mode: {}", inputs.mode.mode));
    parts.push(format!(
        "Market context: {}",
        inputs.alignment.map_or("unknown".to_string(), |a| a.bias.to_string())
    ));
    parts.join("\n")
}

/// Build the final recommendation
pub fn synthesize_recommendation(inputs: &AdvisorInputs<'_>, settings: &AdvisorSettings) -> TradeRecommendation {
    let (mut support, mut resistance) = support_resistance(inputs.daily, inputs.current_price);
    if let Some(sr) = inputs
        .technical
        .and_then(|t| t.get(Timeframe::H4))
        .and_then(|a| a.support_resistance)
    {
        support = support.or(Some(sr.support));
        resistance = resistance.or(Some(sr.resistance));
    }

    let score = direction_score(inputs, support, resistance, settings);
    let (direction, confidence) = determine_direction(inputs.mode.mode, score, settings);

    let average_range = inputs
        .daily
        .filter(|d| !d.sessions.is_empty())
        .map(|d| d.sessions.iter().map(|s| s.range).sum::<f64>() / d.sessions.len() as f64)
        .filter(|range| *range > 0.0)
        .unwrap_or(inputs.current_price * settings.fallback_range_percent / 100.0);

    let levels = price_levels(
        direction,
        inputs.current_price,
        support,
        resistance,
        inputs.mode.mode,
        average_range,
        settings,
    );
    let optimal = levels
        .as_ref()
        .and_then(|l| optimal_entry_range(direction, l.entry, support, resistance, settings.optimal_range_percent));
    let details = levels
        .as_ref()
        .map(|l| risk_reward(direction, l.entry, l.stop_loss, l.take_profit_1, settings.min_risk_reward));
    let invalidation = levels
        .as_ref()
        .and_then(|l| invalidation_level(direction, l.stop_loss, settings.invalidation_buffer));

    let reasons = recommendation_reasons(inputs, support, resistance, settings);
    let summary = summary_line(direction, levels.as_ref());
    let detailed_explanation = explain(direction, inputs, levels.as_ref(), support, resistance, &reasons);
    info!("Recommendation {} (confidence {:.2}, score {:.2})", direction, confidence, score);

    TradeRecommendation {
        direction,
        confidence,
        current_price: round2(inputs.current_price),
        entry: levels.map(|l| l.entry),
        stop_loss: levels.map(|l| l.stop_loss),
        take_profit_1: levels.map(|l| l.take_profit_1),
        take_profit_2: levels.map(|l| l.take_profit_2),
        optimal_entry_range: optimal,
        support_level: support.map(round2),
        resistance_level: resistance.map(round2),
        risk_reward_ratio: details.as_ref().map_or("N/A".to_string(), |d| d.ratio.clone()),
        risk_reward_details: details,
        confidence_breakdown: confidence_breakdown(inputs, direction),
        invalidation_level: invalidation,
        trading_mode: inputs.mode.mode,
        market_bias: inputs.alignment.map(|a| a.bias),
        technical: inputs.technical.map(TechnicalExtract::from_analysis).unwrap_or_default(),
        reasons,
        summary,
        detailed_explanation,
        warnings: warnings(inputs),
        disclaimer: DISCLAIMER.to_string(),
    }
}
