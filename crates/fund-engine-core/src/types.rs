use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.08 = 8%). Never as percentages.
pub type Rate = Decimal;

/// Multiples (e.g., 2.5x TVPI)
pub type Multiple = Decimal;

/// Year fractions or counts
pub type Years = Decimal;

/// A single cash flow at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlow {
    pub date: NaiveDate,
    pub amount: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub label: Option<String>,
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

/// Round a rate for presentation (IRR convention: 4 decimal places).
pub fn round_rate(rate: Rate) -> Rate {
    rate.round_dp(4)
}

/// Round a return multiple for presentation (TVPI/DPI/MOIC: 2 decimal places).
pub fn round_multiple(multiple: Multiple) -> Multiple {
    multiple.round_dp(2)
}

/// Express a multiple differential as whole basis points.
pub fn to_basis_points(differential: Decimal) -> Decimal {
    (differential * dec!(10000)).round()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rounding_conventions() {
        assert_eq!(round_rate(dec!(0.14869835)), dec!(0.1487));
        assert_eq!(round_multiple(dec!(2.4567)), dec!(2.46));
        assert_eq!(to_basis_points(dec!(0.03124)), dec!(312));
    }

    #[test]
    fn test_cash_flow_serde_round_trip() {
        let cf = CashFlow {
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            amount: dec!(-10000),
            label: None,
        };
        let json = serde_json::to_string(&cf).unwrap();
        let back: CashFlow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cf);
    }
}
