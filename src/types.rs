use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::AdvisorConfig;
use crate::data::{CandleSource, SnapshotFiles};
use crate::trading_core::{Candle, Timeframe, TrendDirection};

/// Every successful response is wrapped with a request id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub request_id: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            data,
        }
    }
}

/// Body of POST /api/levels
#[derive(Debug, Clone, Deserialize)]
pub struct LevelsRequest {
    pub current_price: f64,
    pub candles: Vec<Candle>,
    pub max_distance: Option<f64>,
}

/// Body of POST /api/convergence
#[derive(Debug, Clone, Deserialize)]
pub struct ConvergenceRequest {
    pub directions: BTreeMap<Timeframe, TrendDirection>,
}

/// Query of GET /api/report
#[derive(Debug, Clone, Deserialize)]
pub struct ReportQuery {
    pub instrument: Option<String>,
}

/// Shared application state
pub struct AppState {
    pub config: AdvisorConfig,
    /// None when the server runs without a data directory
    pub source: Option<Arc<dyn CandleSource>>,
    pub files: SnapshotFiles,
    pub default_instrument: String,
}
