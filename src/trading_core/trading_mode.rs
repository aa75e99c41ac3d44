//! Trading Mode Classifier
//!
//! Picks the day's trading posture from news proximity, yesterday's
//! volatility and the DXY/bond alignment. Every rule is evaluated on its own
//! and adds fixed points to one or two modes; the highest score wins.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::alignment::{AlignmentAnalysis, AlignmentStatus, DEFAULT_BOND_SYMBOL};
use super::candles::round2;
use super::events::{upcoming_high_impact, EconomicEvent, HighImpactNews};
use super::levels::{Level, LevelKind, LevelMap};
use super::sessions::DailyAnalysis;
use crate::config::ModeConfig;

/// Upcoming releases listed in the detailed explanation
const MAX_LISTED_EVENTS: usize = 2;

/// Releases closer than this are shown as a countdown
const COUNTDOWN_MINUTES: i64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    Calm,
    Aggressive,
    VeryCalm,
    Observe,
}

impl TradingMode {
    /// Declaration order, which also breaks score ties
    pub const ALL: [TradingMode; 4] = [
        TradingMode::Calm,
        TradingMode::Aggressive,
        TradingMode::VeryCalm,
        TradingMode::Observe,
    ];

    /// Modes in which no new position should be opened
    pub fn stands_aside(&self) -> bool {
        matches!(self, TradingMode::VeryCalm | TradingMode::Observe)
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Calm => write!(f, "Calm"),
            TradingMode::Aggressive => write!(f, "Aggressive"),
            TradingMode::VeryCalm => write!(f, "Very calm"),
            TradingMode::Observe => write!(f, "Observe"),
        }
    }
}

/// Rules behind a mode decision, serialised with their stable labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModeRule {
    #[serde(rename = "Noticias próximas")]
    UpcomingNews,
    #[serde(rename = "Volatilidad alta + alineación")]
    HighVolatilityAligned,
    #[serde(rename = "Conflicto + sesiones mixtas + noticias")]
    ConflictMixedNews,
    #[serde(rename = "Múltiples noticias")]
    MultipleNews,
    #[serde(rename = "Condiciones favorables")]
    FavorableConditions,
    #[serde(rename = "Modo por defecto")]
    Default,
}

impl ModeRule {
    pub fn label(&self) -> &'static str {
        match self {
            ModeRule::UpcomingNews => "Noticias próximas",
            ModeRule::HighVolatilityAligned => "Volatilidad alta + alineación",
            ModeRule::ConflictMixedNews => "Conflicto + sesiones mixtas + noticias",
            ModeRule::MultipleNews => "Múltiples noticias",
            ModeRule::FavorableConditions => "Condiciones favorables",
            ModeRule::Default => "Modo por defecto",
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            ModeRule::UpcomingNews | ModeRule::ConflictMixedNews => 10,
            ModeRule::HighVolatilityAligned => 9,
            ModeRule::MultipleNews => 8,
            ModeRule::FavorableConditions => 7,
            ModeRule::Default => 1,
        }
    }
}

impl std::fmt::Display for ModeRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingModeReason {
    pub rule: ModeRule,
    pub description: String,
    pub priority: u8,
}

impl TradingModeReason {
    fn new(rule: ModeRule, description: String) -> Self {
        Self {
            rule,
            description,
            priority: rule.priority(),
        }
    }
}

/// A round level worth trading (or watching) in the chosen mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalLevel {
    pub price: f64,
    pub kind: LevelKind,
    pub distance_points: f64,
    pub distance_percent: f64,
    pub strength: f64,
    pub tests: u32,
    pub suggested_action: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingModeRecommendation {
    pub mode: TradingMode,
    pub confidence: f64,
    pub scores: BTreeMap<TradingMode, f64>,
    /// Highest priority first
    pub reasons: Vec<TradingModeReason>,
    pub summary: String,
    pub detailed_explanation: String,
    pub operational_levels: Vec<OperationalLevel>,
}

impl TradingModeRecommendation {
    pub fn has_reason(&self, rule: ModeRule) -> bool {
        self.reasons.iter().any(|r| r.rule == rule)
    }
}

/// Everything the rules look at
#[derive(Debug, Clone, Copy)]
pub struct ModeInputs<'a> {
    pub now: DateTime<Utc>,
    /// Full calendar, used for the upcoming-release window
    pub events: &'a [EconomicEvent],
    /// Today's high-impact releases
    pub news: &'a HighImpactNews,
    pub daily: Option<&'a DailyAnalysis>,
    pub alignment: Option<&'a AlignmentAnalysis>,
    pub levels: Option<&'a LevelMap>,
}

fn is_high_volatility(daily: Option<&DailyAnalysis>, config: &ModeConfig) -> bool {
    daily.is_some_and(|d| !d.sessions.is_empty() && d.mean_session_range_percent() > config.high_volatility_range_percent)
}

fn window_text(minutes: i64) -> String {
    if minutes >= 60 {
        format!("{} hours", minutes / 60)
    } else {
        format!("{} minutes", minutes)
    }
}

/// Winner, first mode in declaration order on ties
fn winning_mode(scores: &BTreeMap<TradingMode, f64>) -> TradingMode {
    let mut best = TradingMode::Calm;
    let mut best_score = f64::MIN;
    for mode in TradingMode::ALL {
        let score = scores.get(&mode).copied().unwrap_or(0.0);
        if score > best_score {
            best = mode;
            best_score = score;
        }
    }
    best
}

/// 0.5 plus a tenth of the lead over the runner-up
fn mode_confidence(scores: &BTreeMap<TradingMode, f64>) -> f64 {
    let mut sorted: Vec<f64> = scores.values().copied().collect();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let top = sorted.first().copied().unwrap_or(0.0);
    if top <= 0.0 {
        return 0.5;
    }
    let second = sorted.get(1).copied().unwrap_or(0.0);
    round2((0.5 + (top - second) / 10.0).clamp(0.0, 1.0))
}

fn level_tests(level: &Level) -> u32 {
    level.bounce_count + level.break_count
}

fn action_for(mode: TradingMode, level: &Level) -> &'static str {
    match mode {
        TradingMode::Calm => match level.kind {
            LevelKind::Resistance => "Wait for rejection",
            _ => "Wait for bounce",
        },
        TradingMode::Aggressive => {
            if level.is_round_hundred {
                "Bounce or confirmed breakout"
            } else {
                "Pullback entry"
            }
        }
        TradingMode::VeryCalm => "Only with strong confirmation",
        TradingMode::Observe => "Observe only - do not trade",
    }
}

fn explain_level(mode: TradingMode, level: &Level) -> String {
    let tests = level_tests(level);
    if mode == TradingMode::Observe {
        return format!(
            "Reference {} at {:.0} ({} historical tests). {} mode active, no entries.",
            level.kind, level.price, tests, mode
        );
    }
    let bounce_percent = if tests > 0 {
        level.bounce_count as f64 / tests as f64 * 100.0
    } else {
        0.0
    };
    let roundness = if level.is_round_hundred { "Round hundred" } else { "Round fifty" };
    format!(
        "{} {} with {} historical tests ({:.0}% bounces), strength {:.2}. Fits {} mode.",
        roundness, level.kind, tests, bounce_percent, level.strength, mode
    )
}

/// Round levels that pass the mode's filter, nearest first
pub fn operational_levels(mode: TradingMode, map: &LevelMap, config: &ModeConfig) -> Vec<OperationalLevel> {
    let strong = |l: &Level| l.strength >= config.strong_level_strength && level_tests(l) >= config.min_level_tests;
    let (mut candidates, limit): (Vec<&Level>, usize) = match mode {
        TradingMode::Calm => (map.levels.iter().filter(|l| l.is_round_hundred && strong(l)).collect(), 3),
        TradingMode::Aggressive => (
            map.levels
                .iter()
                .filter(|l| (l.is_round_hundred || l.is_round_fifty) && l.strength >= config.aggressive_level_strength)
                .collect(),
            5,
        ),
        TradingMode::VeryCalm => (map.levels.iter().filter(|l| l.is_round_hundred && strong(l)).collect(), 2),
        TradingMode::Observe => (map.levels.iter().filter(|l| l.is_round_hundred).collect(), 2),
    };
    candidates.sort_by(|a, b| a.distance_points.abs().total_cmp(&b.distance_points.abs()));

    candidates
        .into_iter()
        .take(limit)
        .map(|level| OperationalLevel {
            price: level.price,
            kind: level.kind,
            distance_points: level.distance_points,
            distance_percent: level.distance_percent,
            strength: level.strength,
            tests: level_tests(level),
            suggested_action: action_for(mode, level).to_string(),
            explanation: explain_level(mode, level),
        })
        .collect()
}

fn detailed_explanation(
    mode: TradingMode,
    reasons: &[TradingModeReason],
    upcoming: &[EconomicEvent],
    inputs: &ModeInputs<'_>,
    high_volatility: bool,
) -> String {
    let mut parts = vec![format!("Mode suggested today: {}.\nReasons:", mode)];

    for event in upcoming.iter().take(MAX_LISTED_EVENTS) {
        let minutes = (event.date - inputs.now).num_minutes();
        if minutes <= COUNTDOWN_MINUTES {
            parts.push(format!("• {} in {} minutes (high impact USD)", event.description, minutes));
        } else {
            parts.push(format!(
                "• {} at {} UTC (high impact USD)",
                event.description,
                event.date.format("%H:%M")
            ));
        }
    }

    if let Some(alignment) = inputs.alignment {
        match alignment.status {
            AlignmentStatus::Conflict => parts.push(format!("• DXY and {} in conflict.", alignment.bond.symbol)),
            AlignmentStatus::Aligned => parts.push(format!(
                "• DXY and {} aligned ({}).",
                alignment.bond.symbol, alignment.bias
            )),
        }
    }

    if high_volatility {
        let widest = inputs
            .daily
            .and_then(|d| d.sessions.iter().reduce(|best, s| if s.range > best.range { s } else { best }));
        if let Some(session) = widest {
            parts.push(format!("• Yesterday saw high volatility in {} with a wide range.", session.session));
        }
    }

    for reason in reasons {
        if !matches!(
            reason.rule,
            ModeRule::UpcomingNews | ModeRule::HighVolatilityAligned | ModeRule::ConflictMixedNews
        ) {
            parts.push(format!("• {}", reason.description));
        }
    }
    parts.join("\n")
}

/// Score the rules and pick the day's mode
pub fn classify_trading_mode(inputs: &ModeInputs<'_>, config: &ModeConfig) -> TradingModeRecommendation {
    let mut scores: BTreeMap<TradingMode, f64> = TradingMode::ALL.into_iter().map(|m| (m, 0.0)).collect();
    let mut add = |mode: TradingMode, points: f64| {
        if let Some(score) = scores.get_mut(&mode) {
            *score += points;
        }
    };
    let mut reasons = Vec::new();

    let bond_symbol = inputs.alignment.map_or(DEFAULT_BOND_SYMBOL, |a| a.bond.symbol.as_str());
    let aligned = inputs.alignment.is_some_and(|a| a.status == AlignmentStatus::Aligned);
    let conflict = inputs.alignment.is_some_and(|a| a.status == AlignmentStatus::Conflict);
    let high_volatility = is_high_volatility(inputs.daily, config);
    let has_news = inputs.news.has_high_impact_news;

    let upcoming = upcoming_high_impact(inputs.events, inputs.now, Duration::minutes(config.news_window_minutes));
    if !upcoming.is_empty() {
        reasons.push(TradingModeReason::new(
            ModeRule::UpcomingNews,
            format!(
                "{} high-impact USD release(s) in the next {}",
                upcoming.len(),
                window_text(config.news_window_minutes)
            ),
        ));
        add(TradingMode::Calm, config.upcoming_news_calm);
        add(TradingMode::VeryCalm, config.upcoming_news_very_calm);
    }

    if high_volatility && aligned {
        let bias = inputs.alignment.map(|a| a.bias.to_string()).unwrap_or_default();
        reasons.push(TradingModeReason::new(
            ModeRule::HighVolatilityAligned,
            format!("High volatility yesterday and DXY/{} aligned ({})", bond_symbol, bias),
        ));
        add(TradingMode::Aggressive, config.volatility_alignment_aggressive);
    }

    if conflict && inputs.daily.is_some_and(|d| d.has_mixed_sessions()) && has_news {
        reasons.push(TradingModeReason::new(
            ModeRule::ConflictMixedNews,
            format!(
                "DXY and {} in conflict, mixed sessions yesterday and high-impact news",
                bond_symbol
            ),
        ));
        add(TradingMode::VeryCalm, config.conflict_very_calm);
        add(TradingMode::Observe, config.conflict_observe);
    }

    if inputs.news.count >= config.multiple_news_threshold {
        reasons.push(TradingModeReason::new(
            ModeRule::MultipleNews,
            format!("{} high-impact releases today", inputs.news.count),
        ));
        add(TradingMode::Calm, config.multiple_news_calm);
    }

    if !has_news && !high_volatility && aligned {
        reasons.push(TradingModeReason::new(
            ModeRule::FavorableConditions,
            format!("No major news, low volatility and DXY/{} aligned", bond_symbol),
        ));
        add(TradingMode::Aggressive, config.favorable_aggressive);
    }

    let mode = if reasons.is_empty() {
        reasons.push(TradingModeReason::new(
            ModeRule::Default,
            "No specific rule applied, using the conservative mode".to_string(),
        ));
        TradingMode::Calm
    } else {
        winning_mode(&scores)
    };
    let confidence = mode_confidence(&scores);
    reasons.sort_by(|a, b| b.priority.cmp(&a.priority));

    let operational_levels = inputs
        .levels
        .map(|map| operational_levels(mode, map, config))
        .unwrap_or_default();
    let detailed_explanation = detailed_explanation(mode, &reasons, &upcoming, inputs, high_volatility);
    info!("Trading mode {} (confidence {:.2}, {} reasons)", mode, confidence, reasons.len());

    TradingModeRecommendation {
        mode,
        confidence,
        scores,
        summary: format!("Mode suggested today: {}.", mode),
        reasons,
        detailed_explanation,
        operational_levels,
    }
}
