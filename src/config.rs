//! Tunable constants for every analysis stage
//!
//! The weights and thresholds are empirical. Defaults reproduce the reference
//! behaviour; a JSON file can override any subset of them.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Indicator periods and per-timeframe analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub atr_period: usize,
    pub trend_lookback: usize,
    pub impulse_lookback: usize,
    pub support_resistance_lookback: usize,
    pub ema_periods: Vec<usize>,
    /// RSI targets checked on H4
    pub rsi_zones: Vec<f64>,
    /// Percent distance that counts as "near" a support or resistance
    pub near_level_percent: f64,
    pub retest_lookback: usize,
    /// Points
    pub retest_tolerance: f64,
    /// Max distance (points) of psychological levels on H4
    pub h4_level_distance: f64,
    /// Max distance (points) of psychological levels on other timeframes
    pub default_level_distance: f64,
    pub hot_zone_lookback_minutes: i64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            atr_period: 14,
            trend_lookback: 20,
            impulse_lookback: 2,
            support_resistance_lookback: 50,
            ema_periods: vec![50, 100, 200],
            rsi_zones: vec![55.0, 50.0, 45.0],
            near_level_percent: 0.5,
            retest_lookback: 5,
            retest_tolerance: 5.0,
            h4_level_distance: 100.0,
            default_level_distance: 50.0,
            hot_zone_lookback_minutes: 240,
        }
    }
}

/// Psychological level detection and touch history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Points either side of a level that still count as a touch
    pub touch_tolerance: f64,
    pub include_fifties: bool,
    /// Bounces needed for a strength of 1.0
    pub bounces_for_full_strength: f64,
    /// ATR period behind the reaction volatility bucket
    pub atr_period: usize,
    /// Max distance (points) of the report's level map
    pub max_distance: f64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            touch_tolerance: 0.5,
            include_fifties: true,
            bounces_for_full_strength: 5.0,
            atr_period: 14,
            max_distance: 100.0,
        }
    }
}

/// Daily session analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Percent move below which a session or day is flat
    pub direction_threshold_percent: f64,
    pub volatility_period: usize,
    /// Points beyond a level a close must reach to count as a break
    pub break_tolerance: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            direction_threshold_percent: 0.001,
            volatility_period: 14,
            break_tolerance: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutWeights {
    pub weekly_match: f64,
    pub weekly_against: f64,
    pub daily_match: f64,
    pub daily_against: f64,
    pub h4_match: f64,
    pub full_convergence: f64,
    pub partial_convergence: f64,
    pub level_strength: f64,
    pub pattern_quality: f64,
}

impl Default for BreakoutWeights {
    fn default() -> Self {
        Self {
            weekly_match: 0.20,
            weekly_against: -0.15,
            daily_match: 0.15,
            daily_against: -0.10,
            h4_match: 0.10,
            full_convergence: 0.15,
            partial_convergence: 0.10,
            level_strength: 0.08,
            pattern_quality: 0.07,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetestWeights {
    pub weekly_match: f64,
    pub weekly_against: f64,
    pub daily_match: f64,
    pub daily_against: f64,
    pub h4_match: f64,
    pub level_strength: f64,
    pub per_reaction: f64,
    pub reactions_cap: f64,
    pub pattern_quality: f64,
}

impl Default for RetestWeights {
    fn default() -> Self {
        Self {
            weekly_match: 0.15,
            weekly_against: -0.12,
            daily_match: 0.12,
            daily_against: -0.08,
            h4_match: 0.08,
            level_strength: 0.12,
            per_reaction: 0.03,
            reactions_cap: 0.12,
            pattern_quality: 0.08,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationWeights {
    pub per_neutral_trend: f64,
    /// Range under 1%
    pub tight_range: f64,
    /// Range under 2%
    pub moderate_range: f64,
    pub low_volatility: f64,
    pub normal_volatility: f64,
    /// Both directions present and no neutral timeframe
    pub mixed_trends: f64,
}

impl Default for ConsolidationWeights {
    fn default() -> Self {
        Self {
            per_neutral_trend: 0.10,
            tight_range: 0.12,
            moderate_range: 0.08,
            low_volatility: 0.10,
            normal_volatility: 0.05,
            mixed_trends: 0.08,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub base_breakout: f64,
    pub base_retest: f64,
    pub base_consolidation: f64,
    pub breakout: BreakoutWeights,
    pub retest: RetestWeights,
    pub consolidation: ConsolidationWeights,
    /// Daily candles behind the consolidation price range
    pub range_candles: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            base_breakout: 0.50,
            base_retest: 0.55,
            base_consolidation: 0.45,
            breakout: BreakoutWeights::default(),
            retest: RetestWeights::default(),
            consolidation: ConsolidationWeights::default(),
            range_candles: 5,
        }
    }
}

/// Trading-mode rules and operational level filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    /// How far ahead a release counts as upcoming
    pub news_window_minutes: i64,
    /// Mean session range (percent of close) above which the day was volatile
    pub high_volatility_range_percent: f64,
    pub multiple_news_threshold: usize,

    pub upcoming_news_calm: f64,
    pub upcoming_news_very_calm: f64,
    pub volatility_alignment_aggressive: f64,
    pub conflict_very_calm: f64,
    pub conflict_observe: f64,
    pub multiple_news_calm: f64,
    pub favorable_aggressive: f64,

    /// Strength floor for calm and very calm levels
    pub strong_level_strength: f64,
    /// Strength floor for aggressive levels
    pub aggressive_level_strength: f64,
    pub min_level_tests: u32,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            news_window_minutes: 120,
            high_volatility_range_percent: 0.5,
            multiple_news_threshold: 3,
            upcoming_news_calm: 8.0,
            upcoming_news_very_calm: 5.0,
            volatility_alignment_aggressive: 7.0,
            conflict_very_calm: 9.0,
            conflict_observe: 8.0,
            multiple_news_calm: 6.0,
            favorable_aggressive: 5.0,
            strong_level_strength: 0.6,
            aggressive_level_strength: 0.4,
            min_level_tests: 3,
        }
    }
}

/// Recommendation synthesis multipliers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorSettings {
    pub daily_direction_weight: f64,
    pub alignment_weight: f64,
    pub position_weight: f64,
    pub session_majority_weight: f64,
    /// |score| above this picks buy or sell
    pub direction_threshold: f64,
    /// Bottom/top share of the support-resistance range
    pub position_band: f64,

    /// Entry offset from the current price, percent
    pub entry_offset_percent: f64,
    /// Stop distance beyond the level, percent
    pub stop_level_buffer_percent: f64,
    /// Stop distance in average session ranges
    pub stop_range_multiple: f64,
    pub tp1_level_buffer_percent: f64,
    pub tp2_level_buffer_percent: f64,
    pub tp2_range_multiple: f64,
    /// Average range used when no session was traded, percent of price
    pub fallback_range_percent: f64,
    pub optimal_range_percent: f64,
    /// TP2 stretch in aggressive mode
    pub aggressive_tp2_stretch: f64,
    /// Stop tightening in calm mode
    pub calm_stop_tighten: f64,
    pub invalidation_buffer: f64,
    pub min_risk_reward: f64,
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            daily_direction_weight: 0.3,
            alignment_weight: 0.4,
            position_weight: 0.2,
            session_majority_weight: 0.1,
            direction_threshold: 0.2,
            position_band: 0.3,
            entry_offset_percent: 0.05,
            stop_level_buffer_percent: 0.5,
            stop_range_multiple: 1.5,
            tp1_level_buffer_percent: 0.2,
            tp2_level_buffer_percent: 0.2,
            tp2_range_multiple: 2.0,
            fallback_range_percent: 1.0,
            optimal_range_percent: 0.1,
            aggressive_tp2_stretch: 0.10,
            calm_stop_tighten: 0.01,
            invalidation_buffer: 0.002,
            min_risk_reward: 1.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub indicators: IndicatorConfig,
    pub levels: LevelConfig,
    pub sessions: SessionConfig,
    pub scenarios: ScenarioConfig,
    pub mode: ModeConfig,
    pub advisor: AdvisorSettings,
}

impl AdvisorConfig {
    /// Read overrides from a JSON file, or use the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AdvisorConfig::default();
        assert_eq!(config.indicators.rsi_period, 14);
        assert_eq!(config.levels.touch_tolerance, 0.5);
        assert_eq!(config.scenarios.base_retest, 0.55);
        assert_eq!(config.mode.news_window_minutes, 120);
        assert_eq!(config.advisor.min_risk_reward, 1.5);
    }

    #[test]
    fn test_load_without_path() {
        assert_eq!(AdvisorConfig::load(None).unwrap(), AdvisorConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("advisor.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"mode": {{"news_window_minutes": 60}}, "scenarios": {{"retest": {{"per_reaction": 0.05}}}}}}"#).unwrap();

        let config = AdvisorConfig::load(Some(&path)).unwrap();
        assert_eq!(config.mode.news_window_minutes, 60);
        assert_eq!(config.mode.upcoming_news_calm, 8.0);
        assert_eq!(config.scenarios.retest.per_reaction, 0.05);
        assert_eq!(config.scenarios.retest.reactions_cap, 0.12);
        assert_eq!(config.levels, LevelConfig::default());
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(AdvisorConfig::load(Some(&path)).is_err());
        assert!(AdvisorConfig::load(Some(&dir.path().join("missing.json"))).is_err());
    }
}
