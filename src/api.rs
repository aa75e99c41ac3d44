use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::data::load_snapshot;
use crate::trading_core::candles::sort_candles;
use crate::trading_core::convergence::analyze_convergence;
use crate::trading_core::levels::analyze_round_levels;
use crate::trading_core::{build_report, MarketSnapshot};
use crate::types::{ApiResponse, AppState, ConvergenceRequest, LevelsRequest, ReportQuery};

pub type ApiResult = (StatusCode, Json<Value>);

fn ok<T: Serialize>(data: T) -> ApiResult {
    (StatusCode::OK, Json(serde_json::json!(ApiResponse::new(data))))
}

fn fail(status: StatusCode, message: impl std::fmt::Display) -> ApiResult {
    (status, Json(serde_json::json!({"error": message.to_string()})))
}

/// All routes with permissive CORS
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/report", get(get_report).post(post_report))
        .route("/api/levels", post(post_levels))
        .route("/api/convergence", post(post_convergence))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// GET /health
pub async fn health() -> ApiResult {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

/// POST /api/report - Full report for a caller-supplied snapshot
pub async fn post_report(State(state): State<Arc<AppState>>, Json(snapshot): Json<MarketSnapshot>) -> ApiResult {
    match build_report(&snapshot, &state.config) {
        Ok(report) => ok(report),
        Err(e) => fail(StatusCode::BAD_REQUEST, e),
    }
}

/// GET /api/report - Load the latest data and report on it
pub async fn get_report(State(state): State<Arc<AppState>>, Query(params): Query<ReportQuery>) -> ApiResult {
    let Some(source) = state.source.clone() else {
        return fail(StatusCode::SERVICE_UNAVAILABLE, "Candle source not configured");
    };
    let instrument = params.instrument.unwrap_or_else(|| state.default_instrument.clone());
    info!("Report requested for {}", instrument);

    let snapshot = match load_snapshot(source, &instrument, Utc::now(), &state.files).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Snapshot for {} failed: {:#}", instrument, e);
            return fail(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e));
        }
    };
    match build_report(&snapshot, &state.config) {
        Ok(report) => ok(report),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// POST /api/levels - Psychological levels around a price
pub async fn post_levels(State(state): State<Arc<AppState>>, Json(request): Json<LevelsRequest>) -> ApiResult {
    let mut candles = request.candles;
    sort_candles(&mut candles);
    let max_distance = request.max_distance.unwrap_or(state.config.levels.max_distance);
    match analyze_round_levels(request.current_price, &candles, max_distance, &state.config.levels) {
        Ok(map) => ok(map),
        Err(e) => fail(StatusCode::BAD_REQUEST, e),
    }
}

/// POST /api/convergence - Classify a set of timeframe trends
pub async fn post_convergence(Json(request): Json<ConvergenceRequest>) -> ApiResult {
    ok(analyze_convergence(&request.directions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdvisorConfig;
    use crate::data::SnapshotFiles;
    use crate::trading_core::candles::test_support::from_closes;
    use crate::trading_core::report::test_support::snapshot;
    use crate::trading_core::{Timeframe, TrendDirection};
    use crate::types::{ConvergenceRequest, LevelsRequest};

    fn state() -> Arc<AppState> {
        Arc::new(AppState {
            config: AdvisorConfig::default(),
            source: None,
            files: SnapshotFiles::default(),
            default_instrument: "XAUUSD".to_string(),
        })
    }

    #[tokio::test]
    async fn test_post_report_wraps_data() {
        let (status, Json(body)) = post_report(State(state()), Json(snapshot(1))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(uuid::Uuid::parse_str(body["request_id"].as_str().unwrap()).is_ok());
        assert_eq!(body["data"]["instrument"], "XAUUSD");
        assert!(body["data"]["recommendation"]["disclaimer"].is_string());
    }

    #[tokio::test]
    async fn test_empty_snapshot_is_bad_request() {
        let empty = MarketSnapshot::new("XAUUSD", Utc::now());
        let (status, Json(body)) = post_report(State(state()), Json(empty)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("XAUUSD snapshot"));
    }

    #[tokio::test]
    async fn test_get_report_without_source() {
        let query = ReportQuery { instrument: None };
        let (status, _) = get_report(State(state()), Query(query)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_levels_endpoint() {
        let closes: Vec<f64> = (0..20).map(|i| 4490.0 + i as f64).collect();
        let request = LevelsRequest {
            current_price: 4525.0,
            candles: from_closes(&closes),
            max_distance: Some(50.0),
        };
        let (status, Json(body)) = post_levels(State(state()), Json(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["nearest_support"]["price"], 4500.0);

        let invalid = LevelsRequest {
            current_price: -1.0,
            candles: Vec::new(),
            max_distance: None,
        };
        let (status, _) = post_levels(State(state()), Json(invalid)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_levels_endpoint_rejects_bad_distance() {
        for distance in [-10.0, f64::INFINITY, f64::NAN, 1e8] {
            let request = LevelsRequest {
                current_price: 4525.0,
                candles: from_closes(&[4520.0, 4525.0]),
                max_distance: Some(distance),
            };
            let (status, Json(body)) = post_levels(State(state()), Json(request)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body["error"].as_str().unwrap().starts_with("distance must be finite"));
        }

        let huge_price = LevelsRequest {
            current_price: 1e20,
            candles: Vec::new(),
            max_distance: None,
        };
        let (status, _) = post_levels(State(state()), Json(huge_price)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_convergence_endpoint() {
        let directions = [
            (Timeframe::Weekly, TrendDirection::Bullish),
            (Timeframe::Daily, TrendDirection::Bullish),
            (Timeframe::H4, TrendDirection::Bullish),
        ]
        .into_iter()
        .collect();
        let (status, Json(body)) = post_convergence(Json(ConvergenceRequest { directions })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["classification"], "full_bullish");
        assert_eq!(body["data"]["strength"], 1.0);
    }
}
