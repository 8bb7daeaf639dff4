use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use fair_value_core::valuation::calibration::{self, CalibrationInput};
use fair_value_core::valuation::dcf::{self, DcfInput, EquityBridge};
use fair_value_core::valuation::wacc::{self, WaccInput};

use crate::input;

/// Arguments for WACC calculation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct WaccArgs {
    /// Risk-free rate (e.g. 0.042 for 4.2%)
    #[arg(long)]
    pub risk_free_rate: Option<Decimal>,

    /// Equity risk premium (e.g. 0.055 for 5.5%)
    #[arg(long, alias = "erp")]
    pub equity_risk_premium: Option<Decimal>,

    /// Levered beta
    #[arg(long)]
    pub beta: Option<Decimal>,

    /// Interest expense for the fiscal year
    #[arg(long)]
    pub interest_expense: Option<Decimal>,

    /// Effective tax rate (or give --income-tax and --pretax-income)
    #[arg(long)]
    pub tax_rate: Option<Decimal>,

    /// Income tax expense, used with --pretax-income
    #[arg(long)]
    pub income_tax: Option<Decimal>,

    /// Pretax income, used with --income-tax
    #[arg(long)]
    pub pretax_income: Option<Decimal>,

    /// Noncurrent long-term debt
    #[arg(long)]
    pub long_term_debt: Option<Decimal>,

    /// Noncurrent lease obligations
    #[arg(long)]
    pub long_term_lease: Option<Decimal>,

    /// Share price at the valuation date
    #[arg(long)]
    pub share_price: Option<Decimal>,

    /// Common shares outstanding
    #[arg(long)]
    pub common_shares: Option<Decimal>,

    /// Preferred shares outstanding
    #[arg(long)]
    pub preferred_shares: Option<Decimal>,

    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for DCF valuation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct DcfArgs {
    /// Path to JSON/YAML input file with DCF parameters
    #[arg(long)]
    pub input: Option<String>,

    /// Projected FCFF for years 1..N, comma separated
    #[arg(long, value_delimiter = ',')]
    pub fcff: Vec<Decimal>,

    /// Discount rate (WACC)
    #[arg(long)]
    pub wacc: Option<Decimal>,

    /// Perpetual growth rate for the terminal value
    #[arg(long)]
    pub terminal_growth: Option<Decimal>,

    /// Cash and cash equivalents
    #[arg(long)]
    pub cash: Option<Decimal>,

    /// Debt due within a year
    #[arg(long)]
    pub current_debt: Option<Decimal>,

    /// Long-term debt including leases
    #[arg(long)]
    pub long_term_debt: Option<Decimal>,

    /// Shares outstanding
    #[arg(long)]
    pub shares: Option<Decimal>,
}

/// Arguments for implied growth calibration of a single company
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct ImpliedGrowthArgs {
    /// Path to JSON/YAML input file with calibration parameters
    #[arg(long)]
    pub input: Option<String>,

    /// Projected FCFF for years 1..N, comma separated
    #[arg(long, value_delimiter = ',')]
    pub fcff: Vec<Decimal>,

    /// Discount rate (WACC)
    #[arg(long)]
    pub wacc: Option<Decimal>,

    /// Cash and cash equivalents
    #[arg(long)]
    pub cash: Option<Decimal>,

    /// Debt due within a year
    #[arg(long)]
    pub current_debt: Option<Decimal>,

    /// Long-term debt including leases
    #[arg(long)]
    pub long_term_debt: Option<Decimal>,

    /// Shares outstanding
    #[arg(long)]
    pub shares: Option<Decimal>,

    /// Observed share price to reproduce
    #[arg(long)]
    pub share_price: Option<Decimal>,

    /// Path to a config file whose calibration section is used
    #[arg(long)]
    pub config: Option<String>,
}

fn bridge(cash: Option<Decimal>, current_debt: Option<Decimal>, long_term_debt: Option<Decimal>) -> EquityBridge {
    EquityBridge {
        cash_and_equivalents: cash,
        current_debt,
        total_long_term_debt: long_term_debt.unwrap_or_default(),
    }
}

pub fn run_wacc(args: WaccArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let wacc_input: WaccInput = if let Some(ref path) = args.input {
        input::file::read_structured(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        let effective_tax_rate = match (args.tax_rate, args.income_tax, args.pretax_income) {
            (Some(rate), _, _) => rate,
            (None, Some(tax), Some(pretax)) => wacc::effective_tax_rate(tax, pretax)?,
            _ => return Err("--tax-rate or both --income-tax and --pretax-income are required (or provide --input)".into()),
        };
        WaccInput {
            risk_free_rate: args
                .risk_free_rate
                .ok_or("--risk-free-rate is required (or provide --input)")?,
            equity_risk_premium: args
                .equity_risk_premium
                .ok_or("--equity-risk-premium is required (or provide --input)")?,
            beta: args.beta.ok_or("--beta is required (or provide --input)")?,
            interest_expense: args.interest_expense,
            effective_tax_rate,
            long_term_debt: args.long_term_debt,
            long_term_lease: args.long_term_lease,
            share_price: args.share_price,
            common_shares: args.common_shares,
            preferred_shares: args.preferred_shares,
        }
    };

    let result = wacc::calculate_wacc(&wacc_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_dcf(args: DcfArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let dcf_input: DcfInput = if let Some(ref path) = args.input {
        input::file::read_structured(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        if args.fcff.is_empty() {
            return Err("--fcff is required (or provide --input)".into());
        }
        DcfInput {
            projected_fcff: args.fcff,
            wacc: args.wacc.ok_or("--wacc is required (or provide --input)")?,
            perpetual_growth_rate: args
                .terminal_growth
                .ok_or("--terminal-growth is required (or provide --input)")?,
            bridge: bridge(args.cash, args.current_debt, args.long_term_debt),
            shares_outstanding: args.shares.ok_or("--shares is required (or provide --input)")?,
        }
    };

    let result = dcf::calculate_dcf(&dcf_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_implied_growth(args: ImpliedGrowthArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config = input::dataset::load_config(args.config.as_deref())?;

    let calibration_input: CalibrationInput = if let Some(ref path) = args.input {
        input::file::read_structured(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        if args.fcff.is_empty() {
            return Err("--fcff is required (or provide --input)".into());
        }
        CalibrationInput {
            projected_fcff: args.fcff,
            wacc: args.wacc.ok_or("--wacc is required (or provide --input)")?,
            bridge: bridge(args.cash, args.current_debt, args.long_term_debt),
            shares_outstanding: args.shares.ok_or("--shares is required (or provide --input)")?,
            share_price: args
                .share_price
                .ok_or("--share-price is required (or provide --input)")?,
        }
    };

    let result = calibration::calibrate_growth_rate(&calibration_input, &config.calibration)?;
    Ok(serde_json::json!({ "result": result }))
}
