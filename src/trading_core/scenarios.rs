//! Scenario Model
//!
//! Probabilities for the competing scenarios at the current price: a breakout
//! either way, a successful retest of support or resistance, or a range.
//! Each probability is a base plus named additive factors, clamped to [0, 1],
//! so the factor map explains the number exactly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::candles::{Timeframe, TrendDirection};
use super::convergence::{analyze_convergence, ConvergenceKind, ConvergenceResult};
use super::indicators::VolatilityLevel;
use crate::config::{BreakoutWeights, RetestWeights, ScenarioConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    BreakoutBullish,
    BreakoutBearish,
    RetestSupport,
    RetestResistance,
    Consolidation,
}

impl std::fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioKind::BreakoutBullish => write!(f, "Bullish breakout"),
            ScenarioKind::BreakoutBearish => write!(f, "Bearish breakout"),
            ScenarioKind::RetestSupport => write!(f, "Support retest"),
            ScenarioKind::RetestResistance => write!(f, "Resistance retest"),
            ScenarioKind::Consolidation => write!(f, "Consolidation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
}

impl ConfidenceLabel {
    pub fn for_probability(probability: f64) -> Self {
        if probability >= 0.7 {
            ConfidenceLabel::High
        } else if probability >= 0.5 {
            ConfidenceLabel::Medium
        } else {
            ConfidenceLabel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioProbability {
    pub scenario: ScenarioKind,
    pub probability: f64,
    pub confidence: ConfidenceLabel,
    /// Signed contribution of each factor on top of the base probability
    pub factors: BTreeMap<String, f64>,
    pub explanation: String,
}

/// Measured inputs for the scenario model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioInputs {
    pub weekly_trend: TrendDirection,
    pub daily_trend: TrendDirection,
    pub h4_trend: TrendDirection,
    /// 0-1 strength of the levels around price
    pub level_strength: f64,
    /// Reactions recorded at the nearest level
    pub recent_reactions: u32,
    /// Recent high-low range as a percent of price
    pub price_range_percent: f64,
    pub volatility: VolatilityLevel,
    /// 0-1 quality of the latest reaction pattern, if any
    pub pattern_quality: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub weekly_trend: TrendDirection,
    pub daily_trend: TrendDirection,
    pub h4_trend: TrendDirection,
    pub convergence: ConvergenceKind,
    pub convergence_strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioAnalysis {
    pub primary: ScenarioProbability,
    pub alternatives: Vec<ScenarioProbability>,
    pub market_context: MarketContext,
    pub summary: String,
}

/// Match bonus, opposing penalty, or nothing for a neutral trend
fn alignment(trend: TrendDirection, wanted: TrendDirection, bonus: f64, penalty: f64) -> f64 {
    if trend == wanted {
        bonus
    } else if trend != TrendDirection::Neutral {
        penalty
    } else {
        0.0
    }
}

fn finish(scenario: ScenarioKind, base: f64, factors: BTreeMap<String, f64>, explain: impl FnOnce(f64) -> String) -> ScenarioProbability {
    let probability = (base + factors.values().sum::<f64>()).clamp(0.0, 1.0);
    ScenarioProbability {
        scenario,
        probability,
        confidence: ConfidenceLabel::for_probability(probability),
        factors,
        explanation: explain(probability),
    }
}

/// Breakout in `direction` (bullish or bearish)
pub fn breakout_probability(
    direction: TrendDirection,
    inputs: &ScenarioInputs,
    convergence: ConvergenceKind,
    config: &ScenarioConfig,
) -> ScenarioProbability {
    let w: &BreakoutWeights = &config.breakout;
    let scenario = if direction == TrendDirection::Bearish {
        ScenarioKind::BreakoutBearish
    } else {
        ScenarioKind::BreakoutBullish
    };

    let convergence_factor = if convergence.direction() != direction {
        0.0
    } else if convergence.is_full() {
        w.full_convergence
    } else if convergence.is_partial() {
        w.partial_convergence
    } else {
        0.0
    };

    let mut factors = BTreeMap::new();
    factors.insert("weekly_trend".to_string(), alignment(inputs.weekly_trend, direction, w.weekly_match, w.weekly_against));
    factors.insert("daily_confirmation".to_string(), alignment(inputs.daily_trend, direction, w.daily_match, w.daily_against));
    factors.insert(
        "h4_confirmation".to_string(),
        if inputs.h4_trend == direction { w.h4_match } else { 0.0 },
    );
    factors.insert("convergence".to_string(), convergence_factor);
    factors.insert("level_strength".to_string(), inputs.level_strength * w.level_strength);
    factors.insert("pattern_quality".to_string(), inputs.pattern_quality.unwrap_or(0.0) * w.pattern_quality);

    finish(scenario, config.base_breakout, factors, |p| {
        let dir = if direction == TrendDirection::Bearish { "bearish" } else { "bullish" };
        if p >= 0.7 {
            format!("High probability of a {} breakout: {} with weekly and daily aligned.", dir, convergence)
        } else if p >= 0.55 {
            format!(
                "Medium probability of a {} breakout. Weekly: {}, Daily: {}.",
                dir, inputs.weekly_trend, inputs.daily_trend
            )
        } else {
            format!("Low probability of a {} breakout. Higher timeframes do not confirm.", dir)
        }
    })
}

/// Successful retest: a bounce at support or a rejection at resistance
pub fn retest_probability(at_support: bool, inputs: &ScenarioInputs, config: &ScenarioConfig) -> ScenarioProbability {
    let w: &RetestWeights = &config.retest;
    let (scenario, expected, level_text) = if at_support {
        (ScenarioKind::RetestSupport, TrendDirection::Bullish, "support")
    } else {
        (ScenarioKind::RetestResistance, TrendDirection::Bearish, "resistance")
    };

    let mut factors = BTreeMap::new();
    factors.insert("weekly_trend".to_string(), alignment(inputs.weekly_trend, expected, w.weekly_match, w.weekly_against));
    factors.insert("daily_confirmation".to_string(), alignment(inputs.daily_trend, expected, w.daily_match, w.daily_against));
    factors.insert(
        "h4_confirmation".to_string(),
        if inputs.h4_trend == expected { w.h4_match } else { 0.0 },
    );
    factors.insert("level_strength".to_string(), inputs.level_strength * w.level_strength);
    factors.insert(
        "recent_reactions".to_string(),
        (inputs.recent_reactions as f64 * w.per_reaction).min(w.reactions_cap),
    );
    factors.insert("pattern_quality".to_string(), inputs.pattern_quality.unwrap_or(0.0) * w.pattern_quality);

    finish(scenario, config.base_retest, factors, |p| {
        if p >= 0.65 {
            format!(
                "High probability of a successful {} retest. Strong level ({} prior reactions), weekly trend {}.",
                level_text, inputs.recent_reactions, inputs.weekly_trend
            )
        } else if p >= 0.5 {
            format!(
                "Medium probability of a {} retest. Weekly: {}, level strength: {:.0}%.",
                level_text,
                inputs.weekly_trend,
                inputs.level_strength * 100.0
            )
        } else {
            "Low probability of a successful retest. Trends run against the level or the level is weak.".to_string()
        }
    })
}

/// Range-bound market
pub fn consolidation_probability(inputs: &ScenarioInputs, config: &ScenarioConfig) -> ScenarioProbability {
    let w = &config.consolidation;
    let trends = [inputs.weekly_trend, inputs.daily_trend, inputs.h4_trend];
    let neutral_count = trends.iter().filter(|t| **t == TrendDirection::Neutral).count();
    let has_bull = trends.contains(&TrendDirection::Bullish);
    let has_bear = trends.contains(&TrendDirection::Bearish);

    let range_factor = if inputs.price_range_percent < 1.0 {
        w.tight_range
    } else if inputs.price_range_percent < 2.0 {
        w.moderate_range
    } else {
        0.0
    };
    let volatility_factor = match inputs.volatility {
        VolatilityLevel::Low => w.low_volatility,
        VolatilityLevel::Normal => w.normal_volatility,
        _ => 0.0,
    };

    let mut factors = BTreeMap::new();
    factors.insert("neutral_trends".to_string(), neutral_count as f64 * w.per_neutral_trend);
    factors.insert("price_range".to_string(), range_factor);
    factors.insert("volatility".to_string(), volatility_factor);
    factors.insert(
        "divergence".to_string(),
        if has_bull && has_bear && neutral_count == 0 { w.mixed_trends } else { 0.0 },
    );

    finish(ScenarioKind::Consolidation, config.base_consolidation, factors, |_| {
        format!(
            "Consolidation probability based on {} neutral timeframes, {:.1}% range, {} volatility.",
            neutral_count, inputs.price_range_percent, inputs.volatility
        )
    })
}

/// Score all five scenarios and rank them, highest probability first
pub fn analyze_scenarios(inputs: &ScenarioInputs, config: &ScenarioConfig) -> ScenarioAnalysis {
    let directions: BTreeMap<Timeframe, TrendDirection> = [
        (Timeframe::Weekly, inputs.weekly_trend),
        (Timeframe::Daily, inputs.daily_trend),
        (Timeframe::H4, inputs.h4_trend),
    ]
    .into_iter()
    .collect();
    let convergence: ConvergenceResult = analyze_convergence(&directions);

    let mut scenarios = vec![
        breakout_probability(TrendDirection::Bullish, inputs, convergence.classification, config),
        breakout_probability(TrendDirection::Bearish, inputs, convergence.classification, config),
        retest_probability(true, inputs, config),
        retest_probability(false, inputs, config),
        consolidation_probability(inputs, config),
    ];
    scenarios.sort_by(|a, b| b.probability.total_cmp(&a.probability));

    let primary = scenarios.remove(0);
    scenarios.truncate(2);

    let summary = format!(
        "Primary scenario: {} ({:.0}%). Convergence: {} (strength: {:.0}%).",
        primary.scenario,
        primary.probability * 100.0,
        convergence.classification,
        convergence.strength * 100.0
    );

    ScenarioAnalysis {
        primary,
        alternatives: scenarios,
        market_context: MarketContext {
            weekly_trend: inputs.weekly_trend,
            daily_trend: inputs.daily_trend,
            h4_trend: inputs.h4_trend,
            convergence: convergence.classification,
            convergence_strength: convergence.strength,
        },
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn inputs(weekly: TrendDirection, daily: TrendDirection, h4: TrendDirection) -> ScenarioInputs {
        ScenarioInputs {
            weekly_trend: weekly,
            daily_trend: daily,
            h4_trend: h4,
            level_strength: 0.5,
            recent_reactions: 2,
            price_range_percent: 1.5,
            volatility: VolatilityLevel::Normal,
            pattern_quality: None,
        }
    }

    #[test]
    fn test_aligned_bullish_breakout() {
        use TrendDirection::*;
        let config = ScenarioConfig::default();
        let i = inputs(Bullish, Bullish, Bullish);
        let s = breakout_probability(Bullish, &i, ConvergenceKind::FullBullish, &config);
        // 0.50 + 0.20 + 0.15 + 0.10 + 0.15 + 0.04
        assert!((s.probability - 1.0).abs() < 1e-9);
        assert_eq!(s.confidence, ConfidenceLabel::High);
        assert_eq!(s.factors["convergence"], 0.15);
        assert!(s.explanation.starts_with("High probability of a bullish breakout"));

        let against = breakout_probability(Bearish, &i, ConvergenceKind::FullBullish, &config);
        // 0.50 - 0.15 - 0.10 + 0.04
        assert!((against.probability - 0.29).abs() < 1e-9);
        assert_eq!(against.confidence, ConfidenceLabel::Low);
    }

    #[test]
    fn test_retest_factors() {
        use TrendDirection::*;
        let config = ScenarioConfig::default();
        let mut i = inputs(Bullish, Neutral, Bearish);
        i.recent_reactions = 10;
        let s = retest_probability(true, &i, &config);
        assert_eq!(s.factors["recent_reactions"], 0.12);
        assert_eq!(s.factors["daily_confirmation"], 0.0);
        assert_eq!(s.factors["h4_confirmation"], 0.0);
        // 0.55 + 0.15 + 0.06 + 0.12
        assert!((s.probability - 0.88).abs() < 1e-9);
    }

    #[test]
    fn test_consolidation_with_mixed_trends() {
        use TrendDirection::*;
        let config = ScenarioConfig::default();
        let mut i = inputs(Bullish, Bearish, Bullish);
        i.price_range_percent = 0.8;
        i.volatility = VolatilityLevel::Low;
        let s = consolidation_probability(&i, &config);
        // 0.45 + 0 + 0.12 + 0.10 + 0.08
        assert!((s.probability - 0.75).abs() < 1e-9);
        assert!(s.explanation.contains("0 neutral timeframes"));
    }

    #[test]
    fn test_analysis_ranks_scenarios() {
        use TrendDirection::*;
        let analysis = analyze_scenarios(&inputs(Neutral, Neutral, Neutral), &ScenarioConfig::default());
        assert_eq!(analysis.primary.scenario, ScenarioKind::Consolidation);
        assert_eq!(analysis.alternatives.len(), 2);
        assert!(analysis.alternatives[0].probability <= analysis.primary.probability);
        assert_eq!(analysis.market_context.convergence, ConvergenceKind::Neutral);
        assert!(analysis.summary.starts_with("Primary scenario: Consolidation"));
    }

    #[test]
    fn test_probabilities_bounded() {
        let trends = [TrendDirection::Bullish, TrendDirection::Bearish, TrendDirection::Neutral];
        let vols = [VolatilityLevel::Low, VolatilityLevel::Normal, VolatilityLevel::High, VolatilityLevel::Extreme];
        let config = ScenarioConfig::default();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..300 {
            let i = ScenarioInputs {
                weekly_trend: trends[rng.gen_range(0..3)],
                daily_trend: trends[rng.gen_range(0..3)],
                h4_trend: trends[rng.gen_range(0..3)],
                level_strength: rng.gen_range(0.0..=1.0),
                recent_reactions: rng.gen_range(0..20),
                price_range_percent: rng.gen_range(0.0..5.0),
                volatility: vols[rng.gen_range(0..4)],
                pattern_quality: if rng.gen_bool(0.5) { Some(rng.gen_range(0.0..=1.0)) } else { None },
            };
            let analysis = analyze_scenarios(&i, &config);
            for s in std::iter::once(&analysis.primary).chain(analysis.alternatives.iter()) {
                assert!((0.0..=1.0).contains(&s.probability));
            }
        }
    }
}
