//! Full advisory report
//!
//! Runs every stage over one market snapshot: yesterday's session review,
//! per-timeframe technicals, psychological levels, convergence, hot zones,
//! scenarios, news, trading mode and the final recommendation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::advisor::{synthesize_recommendation, AdvisorInputs, TradeRecommendation};
use super::alignment::{AlignmentAnalysis, AlignmentInput};
use super::candles::{Candle, Timeframe, TimeframeCandles};
use super::convergence::{analyze_convergence, detect_hot_zones, ConvergenceResult, HotZone};
use super::events::{high_impact_news, EconomicEvent, HighImpactNews, DEFAULT_NEWS_CURRENCY};
use super::indicators::{atr, VolatilityLevel};
use super::levels::{analyze_round_levels, LevelMap};
use super::scenarios::{analyze_scenarios, ScenarioAnalysis, ScenarioInputs};
use super::sessions::{analyze_latest_day, DailyAnalysis};
use super::technical::{analyze_multi_timeframe, MultiTimeframeAnalysis};
use super::trading_mode::{classify_trading_mode, ModeInputs, TradingModeRecommendation};
use crate::config::AdvisorConfig;
use crate::error::{ensure_price, AnalysisError};

pub const DEFAULT_INSTRUMENT: &str = "XAUUSD";

/// Everything known about the market at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub instrument: String,
    pub as_of: DateTime<Utc>,
    #[serde(default)]
    pub candles: TimeframeCandles,
    #[serde(default)]
    pub events: Vec<EconomicEvent>,
    #[serde(default)]
    pub alignment: Option<AlignmentInput>,
}

impl MarketSnapshot {
    pub fn new(instrument: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self {
            instrument: instrument.into(),
            as_of,
            candles: TimeframeCandles::default(),
            events: Vec::new(),
            alignment: None,
        }
    }

    /// Sort every candle series; stages after this assume chronological input
    pub fn normalize(&mut self) {
        self.candles.normalize();
        self.events.sort_by_key(|e| e.date);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorReport {
    pub instrument: String,
    pub as_of: DateTime<Utc>,
    pub current_price: f64,
    pub daily_analysis: Option<DailyAnalysis>,
    pub technical: MultiTimeframeAnalysis,
    pub levels: LevelMap,
    pub convergence: ConvergenceResult,
    pub hot_zones: Vec<HotZone>,
    pub scenarios: ScenarioAnalysis,
    pub alignment: Option<AlignmentAnalysis>,
    pub news: HighImpactNews,
    pub trading_mode: TradingModeRecommendation,
    pub recommendation: TradeRecommendation,
}

/// Review of the last complete day before `as_of`
fn previous_day_review(snapshot: &MarketSnapshot, config: &AdvisorConfig) -> Option<DailyAnalysis> {
    let today = snapshot.as_of.date_naive();
    let history: Vec<Candle> = snapshot
        .candles
        .h1
        .iter()
        .filter(|c| c.timestamp.date_naive() < today)
        .cloned()
        .collect();
    if history.is_empty() {
        debug!("No H1 candles before {}, skipping the daily review", today);
        return None;
    }
    match analyze_latest_day(&snapshot.instrument, &history, &config.sessions) {
        Ok(daily) => Some(daily),
        Err(e) => {
            warn!("Daily review failed: {}", e);
            None
        }
    }
}

/// High-low range of the last `count` candles as a percent of the last close
fn recent_range_percent(candles: &[Candle], count: usize) -> f64 {
    let recent = &candles[candles.len().saturating_sub(count)..];
    let Some(last) = recent.last() else {
        return 0.0;
    };
    if last.close == 0.0 {
        return 0.0;
    }
    let high = recent.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = recent.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    (high - low) / last.close * 100.0
}

fn scenario_inputs(
    candles: &TimeframeCandles,
    technical: &MultiTimeframeAnalysis,
    levels: &LevelMap,
    current_price: f64,
    config: &AdvisorConfig,
) -> Result<ScenarioInputs, AnalysisError> {
    let around: Vec<f64> = [&levels.nearest_support, &levels.nearest_resistance]
        .into_iter()
        .flatten()
        .map(|l| l.strength)
        .collect();
    let level_strength = if around.is_empty() {
        0.5
    } else {
        around.iter().sum::<f64>() / around.len() as f64
    };

    let recent_reactions = levels
        .levels
        .iter()
        .min_by(|a, b| a.distance_points.abs().total_cmp(&b.distance_points.abs()))
        .map_or(0, |l| l.reaction_count);

    let volatility = if candles.daily.is_empty() {
        VolatilityLevel::Normal
    } else {
        VolatilityLevel::from_atr_percent(atr(&candles.daily, config.indicators.atr_period)?, current_price)
    };

    let pattern_quality = technical
        .get(Timeframe::H4)
        .and_then(|h4| h4.retests.iter().min_by_key(|r| r.candles_ago))
        .map(|r| r.bounce_probability);

    Ok(ScenarioInputs {
        weekly_trend: technical.trend(Timeframe::Weekly),
        daily_trend: technical.trend(Timeframe::Daily),
        h4_trend: technical.trend(Timeframe::H4),
        level_strength,
        recent_reactions,
        price_range_percent: recent_range_percent(&candles.daily, config.scenarios.range_candles),
        volatility,
        pattern_quality,
    })
}

/// Run the whole pipeline over a snapshot. The same snapshot always gives
/// the same report.
pub fn build_report(snapshot: &MarketSnapshot, config: &AdvisorConfig) -> Result<AdvisorReport, AnalysisError> {
    let mut snapshot = snapshot.clone();
    snapshot.normalize();
    let candles = &snapshot.candles;

    let current_price = candles
        .latest_close()
        .ok_or_else(|| AnalysisError::EmptyCandles(format!("{} snapshot", snapshot.instrument)))?;
    ensure_price(current_price)?;
    debug!(
        "Snapshot {} @ {}: {} weekly, {} daily, {} H4, {} H1 candles",
        snapshot.instrument,
        snapshot.as_of,
        candles.weekly.len(),
        candles.daily.len(),
        candles.h4.len(),
        candles.h1.len()
    );

    let daily_analysis = previous_day_review(&snapshot, config);
    let technical = analyze_multi_timeframe(candles, config);
    let levels = analyze_round_levels(current_price, &candles.h1, config.levels.max_distance, &config.levels)?;
    let convergence = analyze_convergence(&technical.trends());
    let hot_zones = detect_hot_zones(
        &candles.h1,
        Timeframe::H1,
        snapshot.as_of,
        config.indicators.hot_zone_lookback_minutes,
    );

    let inputs = scenario_inputs(candles, &technical, &levels, current_price, config)?;
    let scenarios = analyze_scenarios(&inputs, &config.scenarios);

    let today = snapshot.as_of.date_naive();
    let todays_events: Vec<EconomicEvent> = snapshot
        .events
        .iter()
        .filter(|e| e.date.date_naive() == today)
        .cloned()
        .collect();
    let news = high_impact_news(&todays_events, DEFAULT_NEWS_CURRENCY);
    let alignment = snapshot.alignment.as_ref().map(AlignmentInput::analyze);

    let trading_mode = classify_trading_mode(
        &ModeInputs {
            now: snapshot.as_of,
            events: &snapshot.events,
            news: &news,
            daily: daily_analysis.as_ref(),
            alignment: alignment.as_ref(),
            levels: Some(&levels),
        },
        &config.mode,
    );

    let recommendation = synthesize_recommendation(
        &AdvisorInputs {
            instrument: &snapshot.instrument,
            current_price,
            daily: daily_analysis.as_ref(),
            alignment: alignment.as_ref(),
            mode: &trading_mode,
            news: &news,
            technical: Some(&technical),
        },
        &config.advisor,
    );

    info!(
        "{} report @ {}: {} mode, {} ({:.2})",
        snapshot.instrument, snapshot.as_of, trading_mode.mode, recommendation.direction, recommendation.confidence
    );

    Ok(AdvisorReport {
        instrument: snapshot.instrument.clone(),
        as_of: snapshot.as_of,
        current_price,
        daily_analysis,
        technical,
        levels,
        convergence,
        hot_zones,
        scenarios,
        alignment,
        news,
        trading_mode,
        recommendation,
    })
}
