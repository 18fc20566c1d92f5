use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use fund_engine_core::aggregate::{self, FeeImpactInput};
use fund_engine_core::fees::{effective_rate, CapitalContext, FeeProfile};
use fund_engine_core::solver;
use fund_engine_core::types::CashFlow;
use fund_engine_core::waterfall::{self, CarryInput, CarryTerms, DealProceeds, WaterfallType};

use crate::input;

/// Arguments for the dated-flow rate solver
#[derive(Args)]
pub struct RateArgs {
    /// Path to JSON input file: an array of {date, amount} cash flows
    #[arg(long)]
    pub input: Option<String>,

    /// Flow dates (comma-separated ISO dates, e.g. "2021-01-01,2024-01-01")
    #[arg(long, value_delimiter = ',')]
    pub dates: Option<Vec<NaiveDate>>,

    /// Flow amounts (comma-separated, e.g. "-1000,400,400,400")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub amounts: Option<Vec<Decimal>>,
}

pub fn run_rate(args: RateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let flows: Vec<CashFlow> = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let dates = args
            .dates
            .ok_or("--dates is required (or provide --input)")?;
        let amounts = args
            .amounts
            .ok_or("--amounts is required (or provide --input)")?;
        if dates.len() != amounts.len() {
            return Err("--dates and --amounts must have the same length".into());
        }
        dates
            .into_iter()
            .zip(amounts)
            .map(|(date, amount)| CashFlow {
                date,
                amount,
                label: None,
            })
            .collect()
    };

    let result = solver::solve_rate(&flows)?;
    Ok(serde_json::to_value(result)?)
}

/// Fee profile plus the capital snapshot and horizon to project it over.
#[derive(Deserialize)]
struct FeeScheduleInput {
    profile: FeeProfile,
    capital_context: CapitalContext,
    horizon_years: u32,
}

/// Arguments for fee schedule projection
#[derive(Args)]
pub struct FeeScheduleArgs {
    /// Path to JSON input file: {profile, capital_context, horizon_years}
    #[arg(long)]
    pub input: Option<String>,

    /// Override the horizon from the input file
    #[arg(long)]
    pub horizon: Option<u32>,
}

pub fn run_fee_schedule(args: FeeScheduleArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut schedule_input: FeeScheduleInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file.json> or stdin required for fee schedule".into());
    };
    if let Some(horizon) = args.horizon {
        schedule_input.horizon_years = horizon;
    }

    let profile = &schedule_input.profile;
    let ctx = &schedule_input.capital_context;
    profile.validate()?;

    let mut years = Vec::with_capacity(schedule_input.horizon_years as usize);
    let mut total = Decimal::ZERO;
    for year in 1..=schedule_input.horizon_years {
        let fee = profile.annual_fee(ctx, year)?;
        total += fee;
        years.push(serde_json::json!({ "year": year, "fee": fee }));
    }

    Ok(serde_json::json!({
        "result": {
            "total_fees": total,
            "effective_rate_on_committed": effective_rate(total, ctx.committed)?,
            "years": years,
        },
        "warnings": profile.coverage_warnings(),
    }))
}

/// Per-deal proceeds plus shared terms for the deal-by-deal driver.
#[derive(Deserialize)]
struct ByDealInput {
    deals: Vec<DealProceeds>,
    terms: CarryTerms,
}

/// Arguments for the carried-interest waterfall
#[derive(Args)]
pub struct WaterfallArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Run one cascade per deal; requires --input with {deals, terms}
    #[arg(long)]
    pub by_deal: bool,

    /// Gross proceeds to distribute
    #[arg(long, allow_hyphen_values = true)]
    pub gross: Option<Decimal>,

    /// Invested capital
    #[arg(long)]
    pub invested: Option<Decimal>,

    /// Hurdle rate as a decimal (0.08 = 8%)
    #[arg(long, default_value = "0.08")]
    pub hurdle: Decimal,

    /// Carry rate as a decimal (0.20 = 20%)
    #[arg(long, default_value = "0.20")]
    pub carry: Decimal,

    /// Catch-up rate as a decimal (1.0 = full catch-up)
    #[arg(long, default_value = "1.0")]
    pub catch_up: Decimal,
}

pub fn run_waterfall(args: WaterfallArgs) -> Result<Value, Box<dyn std::error::Error>> {
    if args.by_deal {
        let by_deal_input: ByDealInput = if let Some(ref path) = args.input {
            input::file::read_json(path)?
        } else if let Some(data) = input::stdin::read_stdin()? {
            serde_json::from_value(data)?
        } else {
            return Err("--input <file.json> or stdin required for --by-deal".into());
        };
        let result = waterfall::cascade_by_deal(&by_deal_input.deals, &by_deal_input.terms)?;
        return Ok(serde_json::to_value(result)?);
    }

    let carry_input: CarryInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        let gross = args.gross.ok_or("--gross is required (or provide --input)")?;
        let invested = args
            .invested
            .ok_or("--invested is required (or provide --input)")?;
        CarryInput {
            gross_returns: gross,
            invested_capital: invested,
            hurdle_rate: args.hurdle,
            carry_rate: args.carry,
            catch_up_rate: args.catch_up,
            waterfall_type: WaterfallType::European,
        }
    };

    let result = waterfall::cascade(&carry_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for lifetime fee impact aggregation
#[derive(Args)]
pub struct FeeImpactArgs {
    /// Path to JSON input file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_fee_impact(args: FeeImpactArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let impact_input: FeeImpactInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <file.json> or stdin required for fee impact".into());
    };
    let result = aggregate::fee_impact(&impact_input)?;
    Ok(serde_json::to_value(result)?)
}
