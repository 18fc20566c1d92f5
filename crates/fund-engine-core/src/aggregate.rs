use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FundEngineError;
use crate::fees::{CapitalContext, FeeProfile};
use crate::guard::{self, GuardLimits};
use crate::types::{to_basis_points, with_metadata, ComputationOutput, Money, Multiple, Rate};
use crate::waterfall::{run_cascade, CarryInput, CarryTerms};
use crate::FundEngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for a full-lifetime fee impact projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeImpactInput {
    pub fund_size: Money,
    pub fee_profile: FeeProfile,
    /// First-year admin expense; grows geometrically thereafter
    pub admin_expense_base: Money,
    /// Annual admin expense growth rate (0.03 = 3%)
    pub admin_expense_growth: Rate,
    /// Contractual fee-charging horizon / fund term
    pub fund_term_years: u32,
    /// Longest projected exit horizon across the portfolio
    pub longest_exit_horizon_years: u32,
    /// Capital at work; defaults to fund_size when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub invested_capital: Option<Money>,
    /// Gross proceeds; when present the carry waterfall runs
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub gross_returns: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub carry_terms: Option<CarryTerms>,
    /// Basis snapshot for fee resolution; derived from fund_size when
    /// absent (committed = called = fund_size, invested at work)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub capital_context: Option<CapitalContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundYearBreakdown {
    pub year: u32,
    pub management_fee: Money,
    pub admin_expense: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeImpactOutput {
    /// Periods actually simulated: max(exit horizon, fee horizon)
    pub simulation_years: u32,
    pub total_management_fees: Money,
    pub total_admin_expenses: Money,
    pub total_carry: Money,
    pub net_returns: Money,
    pub gross_moic: Multiple,
    pub net_moic: Multiple,
    /// Whole basis points of multiple lost to fees, expenses, and carry
    pub fee_drag_bps: Decimal,
    pub yearly_breakdown: Vec<FundYearBreakdown>,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Project management fees, admin expenses, and carry across the fund's
/// lifetime, and derive gross/net multiples and fee drag.
///
/// The simulation length is `max(longest_exit_horizon_years,
/// fund_term_years)`. Charging fees only through the last projected exit
/// would drop every fee year between that exit and the contractual fee
/// horizon, understating fees and overstating net multiples.
pub fn fee_impact(input: &FeeImpactInput) -> FundEngineResult<ComputationOutput<FeeImpactOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate(input)?;
    input.fee_profile.validate()?;
    warnings.extend(input.fee_profile.coverage_warnings());

    let invested = input.invested_capital.unwrap_or(input.fund_size);
    let ctx = input
        .capital_context
        .clone()
        .unwrap_or_else(|| CapitalContext {
            committed: input.fund_size,
            called_cumulative: input.fund_size,
            returned_capital: Decimal::ZERO,
            invested,
            fair_market_value: invested,
            unrealized_cost: invested,
        });

    let simulation_years = input.longest_exit_horizon_years.max(input.fund_term_years);

    let mut yearly_breakdown = Vec::with_capacity(simulation_years as usize);
    let mut total_management_fees = Decimal::ZERO;
    let mut total_admin_expenses = Decimal::ZERO;
    let growth_factor = Decimal::ONE + input.admin_expense_growth;

    for year in 1..=simulation_years {
        let management_fee = input.fee_profile.annual_fee(&ctx, year)?;
        let admin_expense = input.admin_expense_base * growth_factor.powi(i64::from(year - 1));
        total_management_fees += management_fee;
        total_admin_expenses += admin_expense;
        yearly_breakdown.push(FundYearBreakdown {
            year,
            management_fee,
            admin_expense,
        });
    }

    let total_carry = match (input.gross_returns, &input.carry_terms) {
        (Some(gross), Some(terms)) => {
            run_cascade(&CarryInput::from_terms(gross, invested, terms))?.gp_carry
        }
        (Some(_), None) => {
            warnings.push("gross returns supplied without carry terms; carry assumed zero".into());
            Decimal::ZERO
        }
        (None, _) => Decimal::ZERO,
    };

    let (net_returns, gross_moic, net_moic, fee_drag_bps) = match input.gross_returns {
        Some(gross) => {
            let net = gross - total_management_fees - total_admin_expenses - total_carry;
            let gross_moic = gross / invested;
            let net_moic = net / invested;
            // (gross−inv)/inv − (net−inv)/inv reduces to (gross−net)/inv
            let drag = to_basis_points(gross_moic - net_moic);
            (net, gross_moic, net_moic, drag)
        }
        None => {
            warnings.push("no gross returns supplied; multiples and fee drag not computed".into());
            (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
        }
    };

    let output = FeeImpactOutput {
        simulation_years,
        total_management_fees,
        total_admin_expenses,
        total_carry,
        net_returns,
        gross_moic,
        net_moic,
        fee_drag_bps,
        yearly_breakdown,
    };

    // Boundary contract: nothing non-finite leaves the engine.
    guard::assert_finite(&output, &GuardLimits::default())?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Fee Impact: tiered fees, admin expenses, carry waterfall, fee drag",
        &serde_json::json!({
            "fund_size": input.fund_size.to_string(),
            "fund_term_years": input.fund_term_years,
            "longest_exit_horizon_years": input.longest_exit_horizon_years,
            "admin_expense_base": input.admin_expense_base.to_string(),
            "admin_expense_growth": input.admin_expense_growth.to_string(),
            "tier_count": input.fee_profile.tiers.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn validate(input: &FeeImpactInput) -> FundEngineResult<()> {
    if input.fund_size <= Decimal::ZERO {
        return Err(FundEngineError::InvalidInput {
            field: "fund_size".into(),
            reason: "fund size must be positive".into(),
        });
    }
    if input.fund_term_years == 0 {
        return Err(FundEngineError::InvalidInput {
            field: "fund_term_years".into(),
            reason: "fund term must be at least 1 year".into(),
        });
    }
    if input.admin_expense_base < Decimal::ZERO {
        return Err(FundEngineError::InvalidInput {
            field: "admin_expense_base".into(),
            reason: "admin expense base must be non-negative".into(),
        });
    }
    if input.admin_expense_growth <= dec!(-1) {
        return Err(FundEngineError::InvalidInput {
            field: "admin_expense_growth".into(),
            reason: "admin expense growth must be greater than -100%".into(),
        });
    }
    if let Some(invested) = input.invested_capital {
        if invested <= Decimal::ZERO {
            return Err(FundEngineError::InvalidInput {
                field: "invested_capital".into(),
                reason: "invested capital must be positive".into(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
