mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::fund::{FeeImpactArgs, FeeScheduleArgs, RateArgs, WaterfallArgs};

/// VC fund returns and distribution calculations
#[derive(Parser)]
#[command(
    name = "fe",
    version,
    about = "VC fund returns and distribution calculations",
    long_about = "A CLI for fund economics with decimal precision. Solves dated-flow \
                  IRRs, projects tiered management fees, runs carried-interest \
                  waterfalls, and aggregates lifetime fee impact."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve the annualized rate (IRR) for a dated cash-flow sequence
    Rate(RateArgs),
    /// Project a management fee schedule year by year
    FeeSchedule(FeeScheduleArgs),
    /// Run the carried-interest waterfall cascade
    Waterfall(WaterfallArgs),
    /// Aggregate lifetime fee impact (fees, expenses, carry, fee drag)
    FeeImpact(FeeImpactArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Rate(args) => commands::fund::run_rate(args),
        Commands::FeeSchedule(args) => commands::fund::run_fee_schedule(args),
        Commands::Waterfall(args) => commands::fund::run_waterfall(args),
        Commands::FeeImpact(args) => commands::fund::run_fee_impact(args),
        Commands::Version => {
            println!("fe {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
