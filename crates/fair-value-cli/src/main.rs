mod commands;
mod input;
mod output;
mod persist;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::batch::{CalibrateArgs, FallbackTableArgs, ValueArgs};
use commands::valuation::{DcfArgs, ImpliedGrowthArgs, WaccArgs};

/// FCFF intrinsic value batches and implied growth-rate calibration
#[derive(Parser)]
#[command(
    name = "fairval",
    version,
    about = "FCFF intrinsic value batches and implied growth-rate calibration",
    long_about = "A CLI for valuing companies from reported financials with a five-year \
                  FCFF projection, a Gordon terminal value and decimal precision. \
                  Calibrates the perpetual growth rate implied by market prices and \
                  reuses it, one year lagged, in later valuations."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Value every company and reporting date in a dataset
    Value(ValueArgs),
    /// Solve for market-implied perpetual growth rates across a dataset
    Calibrate(CalibrateArgs),
    /// Build the per-year fallback growth table from implied rates
    FallbackTable(FallbackTableArgs),
    /// Calculate WACC from reported financials and CAPM inputs
    Wacc(WaccArgs),
    /// Discount projected FCFF and a Gordon terminal value to a per-share value
    Dcf(DcfArgs),
    /// Solve one company's market-implied perpetual growth rate
    ImpliedGrowth(ImpliedGrowthArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("fair_value_core=debug,fairval=debug"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("fair_value_core=warn,fairval=info"))
    };

    // stdout carries the command output
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Value(args) => commands::batch::run_value(args),
        Commands::Calibrate(args) => commands::batch::run_calibrate(args),
        Commands::FallbackTable(args) => commands::batch::run_fallback_table(args),
        Commands::Wacc(args) => commands::valuation::run_wacc(args),
        Commands::Dcf(args) => commands::valuation::run_dcf(args),
        Commands::ImpliedGrowth(args) => commands::valuation::run_implied_growth(args),
        Commands::Version => {
            println!("fairval {}", env!("CARGO_PKG_VERSION"));
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
