// Library crate - exports the analysis core, data adapters and HTTP handlers

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod trading_core;
pub mod types;

// Re-export commonly used types
pub use config::AdvisorConfig;
pub use error::AnalysisError;
pub use trading_core::{build_report, AdvisorReport, MarketSnapshot};
pub use types::AppState;
