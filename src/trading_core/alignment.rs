//! DXY / bond yield alignment
//!
//! Gold tends to move against both the dollar index and real yields, so the
//! day's changes in the two are read together: moving the same way they
//! give a clear risk bias, moving apart they give a conflict.

use serde::{Deserialize, Serialize};

use super::candles::{percent_change, round2};

pub const DXY_SYMBOL: &str = "DXY";
pub const DEFAULT_BOND_SYMBOL: &str = "US10Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentStatus {
    Aligned,
    Conflict,
}

impl std::fmt::Display for AlignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlignmentStatus::Aligned => write!(f, "Aligned"),
            AlignmentStatus::Conflict => write!(f, "In conflict"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketBias {
    RiskOn,
    RiskOff,
    Mixed,
}

impl std::fmt::Display for MarketBias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketBias::RiskOn => write!(f, "risk-on"),
            MarketBias::RiskOff => write!(f, "risk-off"),
            MarketBias::Mixed => write!(f, "mixed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentChange {
    pub symbol: String,
    pub price: f64,
    pub previous_price: f64,
    pub change_percent: f64,
    pub rising: bool,
}

impl InstrumentChange {
    fn new(symbol: &str, price: f64, previous_price: f64) -> Self {
        let change = percent_change(price, previous_price);
        Self {
            symbol: symbol.to_string(),
            price,
            previous_price,
            change_percent: round2(change),
            rising: change > 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentAnalysis {
    pub dxy: InstrumentChange,
    pub bond: InstrumentChange,
    pub status: AlignmentStatus,
    pub bias: MarketBias,
    pub summary: String,
}

impl AlignmentAnalysis {
    pub fn is_aligned(&self) -> bool {
        self.status == AlignmentStatus::Aligned
    }
}

/// Raw prices as delivered by the alignment feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentInput {
    pub dxy_current: f64,
    pub dxy_previous: f64,
    pub bond_current: f64,
    pub bond_previous: f64,
    #[serde(default = "default_bond_symbol")]
    pub bond_symbol: String,
}

fn default_bond_symbol() -> String {
    DEFAULT_BOND_SYMBOL.to_string()
}

impl AlignmentInput {
    pub fn analyze(&self) -> AlignmentAnalysis {
        analyze_alignment(
            self.dxy_current,
            self.dxy_previous,
            self.bond_current,
            self.bond_previous,
            &self.bond_symbol,
        )
    }
}

fn classify(dxy_change: f64, bond_change: f64) -> (AlignmentStatus, MarketBias) {
    if dxy_change > 0.0 && bond_change > 0.0 {
        (AlignmentStatus::Aligned, MarketBias::RiskOff)
    } else if dxy_change < 0.0 && bond_change < 0.0 {
        (AlignmentStatus::Aligned, MarketBias::RiskOn)
    } else {
        (AlignmentStatus::Conflict, MarketBias::Mixed)
    }
}

fn signed(change: f64) -> String {
    if change >= 0.0 {
        format!("+{:.2}%", change)
    } else {
        format!("{:.2}%", change)
    }
}

pub fn analyze_alignment(
    dxy_current: f64,
    dxy_previous: f64,
    bond_current: f64,
    bond_previous: f64,
    bond_symbol: &str,
) -> AlignmentAnalysis {
    let dxy = InstrumentChange::new(DXY_SYMBOL, dxy_current, dxy_previous);
    let bond = InstrumentChange::new(bond_symbol, bond_current, bond_previous);
    let (status, bias) = classify(
        percent_change(dxy_current, dxy_previous),
        percent_change(bond_current, bond_previous),
    );

    let bias_text = match bias {
        MarketBias::RiskOff => "risk-off bias",
        MarketBias::RiskOn => "risk-on bias",
        MarketBias::Mixed => "mixed signal",
    };
    let summary = format!(
        "DXY {} and {} {} → {}, {}.",
        signed(dxy.change_percent),
        bond.symbol,
        signed(bond.change_percent),
        status,
        bias_text
    );

    AlignmentAnalysis { dxy, bond, status, bias, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_up_is_risk_off() {
        let a = analyze_alignment(104.0, 103.0, 4.3, 4.2, "US10Y");
        assert_eq!(a.status, AlignmentStatus::Aligned);
        assert_eq!(a.bias, MarketBias::RiskOff);
        assert!(a.dxy.rising && a.bond.rising);
        assert_eq!(a.summary, "DXY +0.97% and US10Y +2.38% → Aligned, risk-off bias.");
    }

    #[test]
    fn test_both_down_is_risk_on() {
        let a = analyze_alignment(102.0, 103.0, 4.1, 4.2, "US02Y");
        assert_eq!(a.status, AlignmentStatus::Aligned);
        assert_eq!(a.bias, MarketBias::RiskOn);
        assert_eq!(a.bond.symbol, "US02Y");
        assert!(a.summary.starts_with("DXY -0.97%"));
    }

    #[test]
    fn test_conflict_and_zero_previous() {
        let a = analyze_alignment(104.0, 103.0, 4.1, 4.2, "US10Y");
        assert_eq!(a.status, AlignmentStatus::Conflict);
        assert_eq!(a.bias, MarketBias::Mixed);
        assert!(a.summary.contains("In conflict, mixed signal"));

        // no previous price means no change, which can never align
        let flat = analyze_alignment(104.0, 0.0, 4.3, 4.2, "US10Y");
        assert_eq!(flat.dxy.change_percent, 0.0);
        assert!(!flat.dxy.rising);
        assert_eq!(flat.status, AlignmentStatus::Conflict);
    }

    #[test]
    fn test_input_defaults_bond_symbol() {
        let input: AlignmentInput = serde_json::from_str(
            r#"{"dxy_current": 104.0, "dxy_previous": 103.0, "bond_current": 4.3, "bond_previous": 4.2}"#,
        )
        .unwrap();
        assert_eq!(input.bond_symbol, "US10Y");
        assert!(input.analyze().is_aligned());
    }
}
