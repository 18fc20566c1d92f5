use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FundEngineError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::FundEngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Carry mechanics are identical for both; the distinction is the unit of
/// account the caller cascades over — the whole fund (European) or one
/// deal at a time (American).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaterfallType {
    European,
    American,
}

/// Contractual carry terms shared across cascade invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarryTerms {
    /// Preferred-return premium over invested capital (0.08 = 8%)
    pub hurdle_rate: Rate,
    /// GP share of profits above the hurdle (0.20 = 20%); must be < 1
    pub carry_rate: Rate,
    /// Fraction of the hurdle premium subject to GP catch-up, in [0, 1]
    pub catch_up_rate: Rate,
    pub waterfall_type: WaterfallType,
}

/// One cascade over one unit of account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarryInput {
    pub gross_returns: Money,
    pub invested_capital: Money,
    pub hurdle_rate: Rate,
    pub carry_rate: Rate,
    pub catch_up_rate: Rate,
    pub waterfall_type: WaterfallType,
}

impl CarryInput {
    pub fn from_terms(gross_returns: Money, invested_capital: Money, terms: &CarryTerms) -> Self {
        CarryInput {
            gross_returns,
            invested_capital,
            hurdle_rate: terms.hurdle_rate,
            carry_rate: terms.carry_rate,
            catch_up_rate: terms.catch_up_rate,
            waterfall_type: terms.waterfall_type,
        }
    }
}

/// GP/LP split produced by the cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarryOutput {
    /// Invested capital plus the hurdle premium
    pub preferred_return: Money,
    /// Proceeds above the preferred return (zero when the hurdle is missed)
    pub excess_returns: Money,
    pub catch_up_amount: Money,
    pub gp_carry: Money,
    pub lp_net: Money,
}

/// Proceeds of a single deal for the American (deal-by-deal) driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealProceeds {
    pub name: String,
    pub invested_capital: Money,
    pub gross_returns: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealCarryResult {
    pub deal: String,
    pub result: CarryOutput,
}

/// Deal-by-deal cascades plus the fund-level cascade over the combined
/// capital and proceeds. The fund-level figure is what a clawback true-up
/// would reconcile the per-deal carry against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealCascadeOutput {
    pub deals: Vec<DealCarryResult>,
    pub total_gp_carry: Money,
    pub total_lp_net: Money,
    pub fund_level: CarryOutput,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Cascade a pool of proceeds through the four distribution tiers:
/// capital return, preferred return, GP catch-up, carry split.
pub fn cascade(input: &CarryInput) -> FundEngineResult<ComputationOutput<CarryOutput>> {
    let start = Instant::now();
    let output = run_cascade(input)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Carried Interest Waterfall: preferred return, catch-up, carry split",
        &serde_json::json!({
            "gross_returns": input.gross_returns.to_string(),
            "invested_capital": input.invested_capital.to_string(),
            "hurdle_rate": input.hurdle_rate.to_string(),
            "carry_rate": input.carry_rate.to_string(),
            "catch_up_rate": input.catch_up_rate.to_string(),
            "waterfall_type": format!("{:?}", input.waterfall_type),
        }),
        Vec::new(),
        elapsed,
        output,
    ))
}

/// American-style driver: one cascade per deal over that deal's own
/// invested capital and proceeds. No clawback reconciliation is applied;
/// the fund-level cascade is returned alongside so a true-up pass has
/// both figures.
pub fn cascade_by_deal(
    deals: &[DealProceeds],
    terms: &CarryTerms,
) -> FundEngineResult<ComputationOutput<DealCascadeOutput>> {
    let start = Instant::now();

    if deals.is_empty() {
        return Err(FundEngineError::InsufficientData(
            "deal-by-deal cascade requires at least one deal".into(),
        ));
    }

    let mut results = Vec::with_capacity(deals.len());
    let mut total_gp_carry = Decimal::ZERO;
    let mut total_lp_net = Decimal::ZERO;
    let mut combined_invested = Decimal::ZERO;
    let mut combined_gross = Decimal::ZERO;

    for deal in deals {
        let result = run_cascade(&CarryInput::from_terms(
            deal.gross_returns,
            deal.invested_capital,
            terms,
        ))?;
        total_gp_carry += result.gp_carry;
        total_lp_net += result.lp_net;
        combined_invested += deal.invested_capital;
        combined_gross += deal.gross_returns;
        results.push(DealCarryResult {
            deal: deal.name.clone(),
            result,
        });
    }

    let fund_level = run_cascade(&CarryInput::from_terms(
        combined_gross,
        combined_invested,
        terms,
    ))?;

    let warnings = vec![
        "deal-by-deal carry computed without clawback reconciliation; compare total_gp_carry \
         against fund_level.gp_carry for the unreconciled difference"
            .to_string(),
    ];

    let output = DealCascadeOutput {
        deals: results,
        total_gp_carry,
        total_lp_net,
        fund_level,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Carried Interest Waterfall: American deal-by-deal driver",
        &serde_json::json!({
            "deal_count": deals.len(),
            "hurdle_rate": terms.hurdle_rate.to_string(),
            "carry_rate": terms.carry_rate.to_string(),
            "catch_up_rate": terms.catch_up_rate.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// The five-step cascade over one unit of account.
pub fn run_cascade(input: &CarryInput) -> FundEngineResult<CarryOutput> {
    validate(input)?;

    let gross = input.gross_returns;
    let invested = input.invested_capital;

    // 1. Preferred return: capital back plus the hurdle premium.
    let preferred_return = invested * (Decimal::ONE + input.hurdle_rate);

    // 2. Hurdle not cleared: all proceeds to LPs, carry is exactly zero.
    if gross <= preferred_return {
        return Ok(CarryOutput {
            preferred_return,
            excess_returns: Decimal::ZERO,
            catch_up_amount: Decimal::ZERO,
            gp_carry: Decimal::ZERO,
            lp_net: gross,
        });
    }

    // 3. Profit pools.
    let excess_returns = gross - preferred_return;
    let hurdle_amount = preferred_return - invested;

    // 4. Full catch-up: the amount that brings the GP to carry_rate of
    //    profits above capital. Diverges as carry_rate -> 1, which
    //    validation has already excluded.
    let full_catch_up = if input.carry_rate.is_zero() {
        Decimal::ZERO
    } else {
        input.carry_rate * hurdle_amount / (Decimal::ONE - input.carry_rate)
    };

    // 5. Catch-up actually taken, limited by the contractual fraction and
    //    by the excess available.
    let max_catch_up = hurdle_amount * input.catch_up_rate;
    let catch_up_amount = full_catch_up.min(max_catch_up).min(excess_returns);

    // 6-7. Split the remainder and assemble the GP/LP totals.
    let remaining_excess = excess_returns - catch_up_amount;
    let carry_from_split = remaining_excess * input.carry_rate;
    let gp_carry = catch_up_amount + carry_from_split;
    let lp_net = gross - gp_carry;

    Ok(CarryOutput {
        preferred_return,
        excess_returns,
        catch_up_amount,
        gp_carry,
        lp_net,
    })
}

fn validate(input: &CarryInput) -> FundEngineResult<()> {
    if input.invested_capital <= Decimal::ZERO {
        return Err(FundEngineError::InvalidInput {
            field: "invested_capital".into(),
            reason: "invested capital must be positive".into(),
        });
    }
    if input.gross_returns < Decimal::ZERO {
        return Err(FundEngineError::InvalidInput {
            field: "gross_returns".into(),
            reason: "gross returns cannot be negative".into(),
        });
    }
    if input.hurdle_rate < Decimal::ZERO {
        return Err(FundEngineError::InvalidInput {
            field: "hurdle_rate".into(),
            reason: "hurdle rate must be non-negative".into(),
        });
    }
    if input.carry_rate < Decimal::ZERO || input.carry_rate >= Decimal::ONE {
        return Err(FundEngineError::InvalidInput {
            field: "carry_rate".into(),
            reason: "carry rate must be in [0, 1); 100% carry makes the catch-up diverge".into(),
        });
    }
    if input.catch_up_rate < Decimal::ZERO || input.catch_up_rate > Decimal::ONE {
        return Err(FundEngineError::InvalidInput {
            field: "catch_up_rate".into(),
            reason: "catch-up rate must be between 0 and 1".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
