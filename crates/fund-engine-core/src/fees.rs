use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::FundEngineError;
use crate::types::{Money, Rate};
use crate::FundEngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Capital aggregate a management-fee percentage is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeBasis {
    CommittedCapital,
    CalledCapitalCumulative,
    CalledCapitalNetOfReturns,
    InvestedCapital,
    FairMarketValue,
    UnrealizedCost,
}

/// Snapshot of the fund's capital figures used to resolve a fee basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalContext {
    pub committed: Money,
    pub called_cumulative: Money,
    pub returned_capital: Money,
    pub invested: Money,
    pub fair_market_value: Money,
    pub unrealized_cost: Money,
}

impl CapitalContext {
    /// Resolve a basis to its amount. Negative snapshots clamp to zero —
    /// a fee cannot be charged on a negative base.
    pub fn resolve(&self, basis: FeeBasis) -> Money {
        let amount = match basis {
            FeeBasis::CommittedCapital => self.committed,
            FeeBasis::CalledCapitalCumulative => self.called_cumulative,
            FeeBasis::CalledCapitalNetOfReturns => self.called_cumulative - self.returned_capital,
            FeeBasis::InvestedCapital => self.invested,
            FeeBasis::FairMarketValue => self.fair_market_value,
            FeeBasis::UnrealizedCost => self.unrealized_cost,
        };
        amount.max(Decimal::ZERO)
    }
}

/// One row of a tiered fee schedule. `end_year` of `None` means the tier
/// is open-ended (runs to the end of whatever horizon is evaluated).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeTier {
    pub basis: FeeBasis,
    pub annual_rate: Rate,
    pub start_year: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub end_year: Option<u32>,
    /// Optional cap expressed as a fraction of the basis amount
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub cap_rate: Option<Rate>,
    /// Optional absolute cap
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub cap_amount: Option<Money>,
}

impl FeeTier {
    pub fn covers(&self, year: u32) -> bool {
        year >= self.start_year && self.end_year.map_or(true, |end| year <= end)
    }
}

/// Fee recycling terms: management fees may be recycled back into
/// investable capital up to a cap, within a limited term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRecyclingPolicy {
    pub enabled: bool,
    /// Cumulative recycling cap as a fraction of the basis amount
    pub cap_rate: Rate,
    pub term_months: u32,
    pub basis: FeeBasis,
}

/// An ordered tier schedule plus optional recycling terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeProfile {
    pub tiers: Vec<FeeTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub recycling: Option<FeeRecyclingPolicy>,
}

impl FeeProfile {
    /// Build a profile, rejecting hard invariant violations up front.
    pub fn new(
        tiers: Vec<FeeTier>,
        recycling: Option<FeeRecyclingPolicy>,
    ) -> FundEngineResult<Self> {
        let profile = FeeProfile { tiers, recycling };
        profile.validate()?;
        Ok(profile)
    }

    /// Hard invariants. Deserialized profiles are re-validated by every
    /// operation, so a hand-built struct cannot skip these checks.
    pub fn validate(&self) -> FundEngineResult<()> {
        if self.tiers.is_empty() {
            return Err(FundEngineError::InvalidInput {
                field: "tiers".into(),
                reason: "fee profile requires at least one tier".into(),
            });
        }

        let mut previous_start = 0u32;
        for (i, tier) in self.tiers.iter().enumerate() {
            if tier.annual_rate < Decimal::ZERO || tier.annual_rate > Decimal::ONE {
                return Err(FundEngineError::InvalidInput {
                    field: format!("tiers[{i}].annual_rate"),
                    reason: "annual rate must be between 0 and 1".into(),
                });
            }
            if tier.start_year == 0 {
                return Err(FundEngineError::InvalidInput {
                    field: format!("tiers[{i}].start_year"),
                    reason: "fund years are 1-based".into(),
                });
            }
            if let Some(end) = tier.end_year {
                if end < tier.start_year {
                    return Err(FundEngineError::InvalidInput {
                        field: format!("tiers[{i}].end_year"),
                        reason: "end year must not precede start year".into(),
                    });
                }
            }
            if tier.start_year <= previous_start && i > 0 {
                return Err(FundEngineError::InvalidInput {
                    field: format!("tiers[{i}].start_year"),
                    reason: "tiers must be ordered by ascending start year".into(),
                });
            }
            if let Some(cap) = tier.cap_rate {
                if cap < Decimal::ZERO {
                    return Err(FundEngineError::InvalidInput {
                        field: format!("tiers[{i}].cap_rate"),
                        reason: "cap rate must be non-negative".into(),
                    });
                }
            }
            previous_start = tier.start_year;
        }

        if let Some(ref policy) = self.recycling {
            if policy.enabled && (policy.cap_rate <= Decimal::ZERO || policy.term_months == 0) {
                return Err(FundEngineError::InvalidInput {
                    field: "recycling".into(),
                    reason: "enabled recycling requires positive cap_rate and term_months".into(),
                });
            }
        }

        Ok(())
    }

    /// Soft invariants: gaps and overlaps in tier year ranges are warned
    /// about, not rejected. An uncovered year charges a zero fee.
    pub fn coverage_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut next_expected = 1u32;

        for (i, tier) in self.tiers.iter().enumerate() {
            if tier.start_year > next_expected {
                warnings.push(format!(
                    "fee tiers leave years {}..{} uncovered before tiers[{i}]; uncovered years charge no fee",
                    next_expected,
                    tier.start_year - 1
                ));
            } else if i > 0 && tier.start_year < next_expected {
                warnings.push(format!(
                    "tiers[{i}] overlaps the previous tier from year {}; the earlier tier takes precedence",
                    tier.start_year
                ));
            }
            match tier.end_year {
                Some(end) => next_expected = next_expected.max(end + 1),
                None => {
                    if i + 1 < self.tiers.len() {
                        warnings.push(format!(
                            "tiers[{i}] is open-ended but not last; later tiers are unreachable"
                        ));
                    }
                    break;
                }
            }
        }

        warnings
    }

    /// Management fee charged for a single fund-year.
    ///
    /// The first tier whose `[start_year, end_year]` range contains the
    /// year is selected; a year covered by no tier charges zero. Caps
    /// apply as `min(basis × rate, cap_rate × basis, cap_amount)`.
    pub fn annual_fee(&self, ctx: &CapitalContext, year: u32) -> FundEngineResult<Money> {
        self.validate()?;
        if year == 0 {
            return Err(FundEngineError::InvalidInput {
                field: "year".into(),
                reason: "fund years are 1-based".into(),
            });
        }

        let tier = match self.tiers.iter().find(|t| t.covers(year)) {
            Some(t) => t,
            None => return Ok(Decimal::ZERO),
        };

        let basis_amount = ctx.resolve(tier.basis);
        let mut fee = basis_amount * tier.annual_rate;
        if let Some(cap_rate) = tier.cap_rate {
            fee = fee.min(basis_amount * cap_rate);
        }
        if let Some(cap_amount) = tier.cap_amount {
            fee = fee.min(cap_amount);
        }
        Ok(fee.max(Decimal::ZERO))
    }

    /// Total management fees over `horizon_years` fund-years.
    pub fn total_fees(&self, ctx: &CapitalContext, horizon_years: u32) -> FundEngineResult<Money> {
        self.validate()?;
        let mut total = Decimal::ZERO;
        for year in 1..=horizon_years {
            total += self.annual_fee(ctx, year)?;
        }
        Ok(total)
    }
}

/// Fees as a fraction of the amount they were charged against.
pub fn effective_rate(total_fees: Money, basis_amount: Money) -> FundEngineResult<Rate> {
    if basis_amount.is_zero() {
        return Err(FundEngineError::DivisionByZero {
            context: "effective fee rate basis".into(),
        });
    }
    Ok(total_fees / basis_amount)
}

/// Portion of `fees_paid` eligible for recycling in `year`.
///
/// Rules, applied in order: recycling must be enabled; the year must fall
/// within the recycling term (months rounded up to whole years); the
/// cumulative recycled amount is capped at `basis × cap_rate`. The result
/// is `min(fees_paid, remaining_cap)`.
pub fn recyclable_amount(
    policy: &FeeRecyclingPolicy,
    fees_paid: Money,
    cumulative_recycled: Money,
    ctx: &CapitalContext,
    year: u32,
) -> FundEngineResult<Money> {
    if fees_paid < Decimal::ZERO {
        return Err(FundEngineError::InvalidInput {
            field: "fees_paid".into(),
            reason: "fees paid must be non-negative".into(),
        });
    }
    if !policy.enabled {
        return Ok(Decimal::ZERO);
    }
    if policy.cap_rate <= Decimal::ZERO || policy.term_months == 0 {
        return Err(FundEngineError::InvalidInput {
            field: "recycling".into(),
            reason: "enabled recycling requires positive cap_rate and term_months".into(),
        });
    }

    let term_years = policy.term_months.div_ceil(12);
    if year > term_years {
        return Ok(Decimal::ZERO);
    }

    let cap = ctx.resolve(policy.basis) * policy.cap_rate;
    let remaining = (cap - cumulative_recycled).max(Decimal::ZERO);
    Ok(fees_paid.min(remaining))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
