//! Input validation errors for the analysis core
//!
//! Missing data is never an error here: indicators return `None` when there
//! are not enough candles. These variants cover calls that cannot produce a
//! meaningful result at all.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("{name} must be a positive number of candles (got {value})")]
    InvalidPeriod { name: &'static str, value: usize },

    #[error("no candles available for {0}")]
    EmptyCandles(String),

    #[error("price must be positive and finite (got {0})")]
    InvalidPrice(f64),

    #[error("distance must be finite and between 0 and {max} points (got {value})")]
    InvalidDistance { value: f64, max: f64 },
}

/// Reject zero-length periods and lookbacks
pub fn ensure_period(name: &'static str, value: usize) -> Result<(), AnalysisError> {
    if value == 0 {
        return Err(AnalysisError::InvalidPeriod { name, value });
    }
    Ok(())
}

/// Reject prices that cannot anchor a level or percentage
pub fn ensure_price(price: f64) -> Result<(), AnalysisError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(AnalysisError::InvalidPrice(price));
    }
    Ok(())
}

/// Reject search distances that are negative, non-finite or above `max`
pub fn ensure_distance(value: f64, max: f64) -> Result<(), AnalysisError> {
    if !value.is_finite() || value < 0.0 || value > max {
        return Err(AnalysisError::InvalidDistance { value, max });
    }
    Ok(())
}
