//! Trading Core - Shared analysis logic for both pipeline and web server
//!
//! This module contains the XAUUSD decision core:
//! - Candles, indicators and trend detection
//! - Psychological round levels and their reaction history
//! - Candle patterns and retests
//! - Session review of the previous day
//! - Multi-timeframe technicals and convergence
//! - Scenario probabilities
//! - DXY/bond alignment and economic events
//! - Trading mode classification
//! - Trade recommendation and the full report

pub mod candles;
pub mod indicators;
pub mod levels;
pub mod reactions;
pub mod patterns;
pub mod sessions;
pub mod convergence;
pub mod scenarios;
pub mod alignment;
pub mod events;
pub mod technical;
pub mod trading_mode;
pub mod advisor;
pub mod report;

// Re-export commonly used types
pub use candles::{Candle, Timeframe, TimeframeCandles, TrendDirection};
pub use indicators::{Impulse, SupportResistance, VolatilityLevel};
pub use levels::{Level, LevelKind, LevelMap};
pub use reactions::{Reaction, ReactionType};
pub use patterns::{CandlePattern, Retest};
pub use sessions::{DailyAnalysis, SessionAnalysis, TradingSession};
pub use convergence::{ConvergenceKind, ConvergenceResult, HotZone};
pub use scenarios::{ScenarioAnalysis, ScenarioInputs, ScenarioKind, ScenarioProbability};
pub use alignment::{AlignmentAnalysis, AlignmentInput, MarketBias};
pub use events::{EconomicEvent, HighImpactNews, ImpactLevel};
pub use technical::{MultiTimeframeAnalysis, TimeframeAnalysis, TimeframeReport};
pub use trading_mode::{TradingMode, TradingModeRecommendation};
pub use advisor::{TradeDirection, TradeRecommendation};
pub use report::{build_report, AdvisorReport, MarketSnapshot};
