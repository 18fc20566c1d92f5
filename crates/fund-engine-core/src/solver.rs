use chrono::NaiveDate;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::FundEngineError;
use crate::types::{CashFlow, Money, Rate};
use crate::FundEngineResult;

const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const DERIVATIVE_THRESHOLD: Decimal = dec!(0.000000000001);
const MAX_NEWTON_ITERATIONS: u32 = 100;
const MAX_BISECTION_STEPS: u32 = 200;
const DAYS_PER_YEAR: Decimal = dec!(365);
const INITIAL_GUESS: Decimal = dec!(0.10);
const DOMAIN_FLOOR: Decimal = dec!(-0.9999);
const BRACKET_CEILING: Decimal = dec!(320);

/// Root-finding method that produced the rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverMethod {
    NewtonRaphson,
    Bisection,
}

/// Annualized internal rate of return for a dated cash-flow sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSolution {
    pub rate: Rate,
    pub converged: bool,
    pub iterations: u32,
    pub method: SolverMethod,
}

/// Cash flow reduced to a year fraction from the earliest flow date.
struct TimedFlow {
    years: Decimal,
    amount: Money,
}

/// Solve for the annualized rate that zeroes the net present value of
/// `flows` under an actual/365 day count from the earliest flow date.
///
/// Newton-Raphson with an analytic derivative is tried first; if the
/// derivative degenerates, the iterate leaves the valid domain, or the
/// iteration cap is hit, the solver falls back to bisection over a
/// sign-changing bracket located by a widening scan. A cash-flow pattern
/// with no detectable bracket fails explicitly — the rate is undefined,
/// never substituted with zero.
pub fn solve_rate(flows: &[CashFlow]) -> FundEngineResult<RateSolution> {
    let timed = validate_and_time(flows)?;

    let mut rate = INITIAL_GUESS;
    let mut last_npv = Decimal::MAX;

    for iteration in 0..MAX_NEWTON_ITERATIONS {
        let (npv_val, dnpv) = match npv_and_derivative(rate, &timed) {
            Some(pair) => pair,
            None => break, // discount factor degenerated; bisection is safer
        };
        last_npv = npv_val;

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return Ok(RateSolution {
                rate,
                converged: true,
                iterations: iteration,
                method: SolverMethod::NewtonRaphson,
            });
        }

        if dnpv.abs() < DERIVATIVE_THRESHOLD {
            break;
        }

        let next = rate - npv_val / dnpv;
        if next <= dec!(-1) {
            break;
        }
        rate = next;
    }

    bisect(&timed, last_npv)
}

/// Net present value of `flows` at `rate`, actual/365 from the earliest date.
pub fn npv_at(rate: Rate, flows: &[CashFlow]) -> FundEngineResult<Money> {
    if rate <= dec!(-1) {
        return Err(FundEngineError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }
    let timed = validate_and_time(flows)?;
    npv(rate, &timed).ok_or_else(|| FundEngineError::DivisionByZero {
        context: format!("NPV discount factor at rate {rate}"),
    })
}

fn validate_and_time(flows: &[CashFlow]) -> FundEngineResult<Vec<TimedFlow>> {
    if flows.len() < 2 {
        return Err(FundEngineError::InsufficientData(
            "rate solving requires at least 2 cash flows".into(),
        ));
    }

    let has_negative = flows.iter().any(|cf| cf.amount < Decimal::ZERO);
    let has_positive = flows.iter().any(|cf| cf.amount > Decimal::ZERO);
    if !has_negative || !has_positive {
        return Err(FundEngineError::InvalidInput {
            field: "flows".into(),
            reason: "cash flows must contain at least one negative and one positive amount".into(),
        });
    }

    // Dates need not arrive sorted; the day count anchors on the earliest.
    let base: NaiveDate = flows.iter().map(|cf| cf.date).min().ok_or_else(|| {
        FundEngineError::InsufficientData("rate solving requires at least 2 cash flows".into())
    })?;

    Ok(flows
        .iter()
        .map(|cf| TimedFlow {
            years: Decimal::from((cf.date - base).num_days()) / DAYS_PER_YEAR,
            amount: cf.amount,
        })
        .collect())
}

/// NPV(r) = Σ CFᵢ / (1+r)^tᵢ. Returns None when a discount factor
/// under- or overflows Decimal range.
fn npv(rate: Rate, timed: &[TimedFlow]) -> Option<Money> {
    let one_plus_r = Decimal::ONE + rate;
    let mut result = Decimal::ZERO;

    for tf in timed {
        let discount = one_plus_r.checked_powd(tf.years)?;
        if discount.is_zero() {
            return None;
        }
        result += tf.amount.checked_div(discount)?;
    }

    Some(result)
}

/// NPV and its analytic derivative dNPV/dr = Σ -tᵢ·CFᵢ / (1+r)^(tᵢ+1).
fn npv_and_derivative(rate: Rate, timed: &[TimedFlow]) -> Option<(Money, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    let mut npv_val = Decimal::ZERO;
    let mut dnpv = Decimal::ZERO;

    for tf in timed {
        let discount = one_plus_r.checked_powd(tf.years)?;
        if discount.is_zero() {
            return None;
        }
        npv_val += tf.amount.checked_div(discount)?;
        dnpv -= tf
            .years
            .checked_mul(tf.amount)?
            .checked_div(one_plus_r.checked_mul(discount)?)?;
    }

    Some((npv_val, dnpv))
}

/// Candidate endpoints for the widening bracket scan. Fixed probes cover
/// `[-0.9999, 10]`; the upper bound then doubles out to the ceiling.
fn bracket_candidates() -> Vec<Decimal> {
    let mut points = vec![
        DOMAIN_FLOOR,
        dec!(-0.75),
        dec!(-0.5),
        dec!(-0.25),
        dec!(-0.1),
        dec!(0),
        dec!(0.1),
        dec!(0.25),
        dec!(0.5),
        dec!(1),
        dec!(2),
        dec!(5),
        dec!(10),
    ];
    let mut upper = dec!(20);
    while upper <= BRACKET_CEILING {
        points.push(upper);
        upper *= dec!(2);
    }
    points
}

fn bisect(timed: &[TimedFlow], last_newton_npv: Decimal) -> FundEngineResult<RateSolution> {
    // Scan adjacent candidate pairs for a sign change in NPV.
    let mut bracket: Option<(Decimal, Decimal, Decimal)> = None;
    let mut prev: Option<(Decimal, Decimal)> = None;

    for point in bracket_candidates() {
        let value = match npv(point, timed) {
            Some(v) => v,
            None => {
                prev = None; // unusable endpoint breaks the chain
                continue;
            }
        };
        if value.is_zero() {
            return Ok(RateSolution {
                rate: point,
                converged: true,
                iterations: 0,
                method: SolverMethod::Bisection,
            });
        }
        if let Some((lo, f_lo)) = prev {
            if (f_lo.is_sign_negative()) != (value.is_sign_negative()) {
                bracket = Some((lo, point, f_lo));
                break;
            }
        }
        prev = Some((point, value));
    }

    let (mut lo, mut hi, mut f_lo) = bracket.ok_or(FundEngineError::ConvergenceFailure {
        function: "solve_rate (no sign-changing bracket; rate undefined for this cash-flow pattern)"
            .into(),
        iterations: MAX_NEWTON_ITERATIONS,
        last_delta: last_newton_npv,
    })?;

    for step in 1..=MAX_BISECTION_STEPS {
        let mid = (lo + hi) / dec!(2);
        let f_mid = npv(mid, timed).ok_or(FundEngineError::ConvergenceFailure {
            function: "solve_rate (bisection midpoint left Decimal range)".into(),
            iterations: step,
            last_delta: f_lo,
        })?;

        if f_mid.abs() < CONVERGENCE_THRESHOLD {
            return Ok(RateSolution {
                rate: mid,
                converged: true,
                iterations: step,
                method: SolverMethod::Bisection,
            });
        }

        if (f_lo.is_sign_negative()) == (f_mid.is_sign_negative()) {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(FundEngineError::ConvergenceFailure {
        function: "solve_rate (bisection)".into(),
        iterations: MAX_BISECTION_STEPS,
        last_delta: f_lo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn flow(y: i32, m: u32, d: u32, amount: Decimal) -> CashFlow {
        CashFlow {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            amount,
            label: None,
        }
    }

    #[test]
    fn test_two_flow_round_trip() {
        // -10000 at t0, 10000 * (1+r)^(731/365) two calendar years later
        // must recover r.
        let seeded = dec!(0.12);
        let t = dec!(731) / dec!(365);
        let terminal = dec!(10000) * (Decimal::ONE + seeded).powd(t);
        let flows = vec![
            flow(2020, 1, 1, dec!(-10000)),
            flow(2022, 1, 1, terminal),
        ];
        let solution = solve_rate(&flows).unwrap();
        assert!(
            (solution.rate - seeded).abs() < dec!(0.000001),
            "expected {}, got {}",
            seeded,
            solution.rate
        );
        assert!(solution.converged);
    }

    #[test]
    fn test_reference_flow_set() {
        // NPV(r) = Σ CFᵢ/(1+r)^(daysᵢ/365) = 0 for this schedule has its
        // root at ~32.8706%.
        let flows = vec![
            flow(2020, 1, 1, dec!(-10000)),
            flow(2020, 6, 1, dec!(2750)),
            flow(2020, 12, 1, dec!(4250)),
            flow(2021, 1, 1, dec!(3250)),
            flow(2021, 6, 1, dec!(2750)),
        ];
        let solution = solve_rate(&flows).unwrap();
        assert!(
            (solution.rate - dec!(0.3287058899)).abs() < dec!(0.0000005),
            "got {}",
            solution.rate
        );
        // Residual NPV at the solved rate is within the solver tolerance.
        let residual = npv_at(solution.rate, &flows).unwrap();
        assert!(residual.abs() < dec!(0.0000001), "residual {}", residual);
    }

    #[test]
    fn test_negative_rate_recovered() {
        // Losing investment: -1000 then 600 one year out => rate -40%.
        let flows = vec![flow(2020, 1, 1, dec!(-1000)), flow(2020, 12, 31, dec!(600))];
        let solution = solve_rate(&flows).unwrap();
        assert!(
            (solution.rate - dec!(-0.4)).abs() < dec!(0.000001),
            "got {}",
            solution.rate
        );
    }

    #[test]
    fn test_unsorted_dates_anchor_on_earliest() {
        let sorted = vec![
            flow(2020, 1, 1, dec!(-1000)),
            flow(2021, 1, 1, dec!(500)),
            flow(2022, 1, 1, dec!(800)),
        ];
        let shuffled = vec![sorted[2].clone(), sorted[0].clone(), sorted[1].clone()];
        let a = solve_rate(&sorted).unwrap();
        let b = solve_rate(&shuffled).unwrap();
        assert_eq!(a.rate, b.rate);
    }

    #[test]
    fn test_rejects_single_flow() {
        let flows = vec![flow(2020, 1, 1, dec!(-1000))];
        assert!(matches!(
            solve_rate(&flows),
            Err(FundEngineError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_rejects_same_sign_flows() {
        let flows = vec![
            flow(2020, 1, 1, dec!(1000)),
            flow(2021, 1, 1, dec!(500)),
            flow(2022, 1, 1, dec!(700)),
        ];
        match solve_rate(&flows) {
            Err(FundEngineError::InvalidInput { field, .. }) => assert_eq!(field, "flows"),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_npv_at_rejects_domain_violation() {
        let flows = vec![flow(2020, 1, 1, dec!(-1000)), flow(2021, 1, 1, dec!(1100))];
        assert!(npv_at(dec!(-1), &flows).is_err());
    }

    #[test]
    fn test_npv_sign_behavior() {
        let flows = vec![flow(2020, 1, 1, dec!(-1000)), flow(2021, 1, 1, dec!(1100))];
        // Root is ~10% (366-day year fraction shifts it slightly).
        assert!(npv_at(dec!(0.05), &flows).unwrap() > Decimal::ZERO);
        assert!(npv_at(dec!(0.20), &flows).unwrap() < Decimal::ZERO);
    }

    #[test]
    fn test_idempotent() {
        let flows = vec![
            flow(2020, 1, 1, dec!(-10000)),
            flow(2020, 6, 1, dec!(2750)),
            flow(2020, 12, 1, dec!(4250)),
            flow(2021, 1, 1, dec!(3250)),
            flow(2021, 6, 1, dec!(2750)),
        ];
        let a = solve_rate(&flows).unwrap();
        let b = solve_rate(&flows).unwrap();
        assert_eq!(a, b);
    }
}
