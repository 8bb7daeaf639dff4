use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::data::concepts::LineItem;
use crate::error::{FairValueError, RequiredInput};
use crate::types::{with_metadata, ComputationOutput, Money, Rate, Shares};
use crate::FairValueResult;

/// Input parameters for Weighted Average Cost of Capital calculation.
///
/// Balance-sheet fields are taken as reported; absent debt and share classes
/// count as zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaccInput {
    /// Risk-free rate (e.g. 10-year treasury yield)
    pub risk_free_rate: Rate,
    /// Equity risk premium (market return minus risk-free rate)
    pub equity_risk_premium: Rate,
    /// Levered beta of equity
    pub beta: Decimal,
    /// Reported interest expense; required only when the firm carries long-term debt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_expense: Option<Money>,
    /// Effective tax rate (income tax / pretax income)
    pub effective_tax_rate: Rate,
    /// Non-current long-term debt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_term_debt: Option<Money>,
    /// Non-current finance lease obligations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_term_lease: Option<Money>,
    /// Share price at the valuation date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_shares: Option<Shares>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_shares: Option<Shares>,
}

impl WaccInput {
    /// Long-term debt plus long-term lease obligations.
    pub fn total_long_term_debt(&self) -> Money {
        self.long_term_debt.unwrap_or(Decimal::ZERO) + self.long_term_lease.unwrap_or(Decimal::ZERO)
    }

    /// Common plus preferred shares outstanding.
    pub fn shares_outstanding(&self) -> Shares {
        self.common_shares.unwrap_or(Decimal::ZERO) + self.preferred_shares.unwrap_or(Decimal::ZERO)
    }
}

/// Output of the WACC calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaccOutput {
    /// Weighted average cost of capital
    pub wacc: Rate,
    /// Cost of equity via CAPM
    pub cost_of_equity: Rate,
    /// Pre-tax cost of debt (interest expense / long-term debt)
    pub cost_of_debt_pretax: Rate,
    /// After-tax cost of debt
    pub after_tax_cost_of_debt: Rate,
    pub total_long_term_debt: Money,
    pub market_cap: Money,
    pub shares_outstanding: Shares,
    /// Book debt / (book debt + market equity)
    pub debt_weight: Rate,
    pub equity_weight: Rate,
}

/// Effective tax rate as reported: income tax over pretax income.
pub fn effective_tax_rate(income_tax: Money, pretax_income: Money) -> FairValueResult<Rate> {
    if pretax_income.is_zero() {
        return Err(FairValueError::DivisionByZero {
            context: "effective tax rate (pretax income is zero)".into(),
        });
    }
    Ok(income_tax / pretax_income)
}

/// Compute WACC from reported capital structure and CAPM inputs.
///
/// Cost of equity: Ke = Rf + Beta * ERP
/// After-tax cost of debt: Kd_at = (interest / LTD) * (1 - t), or 0 for a debt-free firm
/// WACC = Wd * Kd_at + We * Ke, with Wd = LTD / (LTD + market cap)
pub fn compute_wacc(input: &WaccInput) -> FairValueResult<WaccOutput> {
    let share_price = match input.share_price {
        Some(p) if p > Decimal::ZERO => p,
        _ => return Err(FairValueError::MissingInput(RequiredInput::SharePrice)),
    };

    let shares_outstanding = input.shares_outstanding();
    if shares_outstanding <= Decimal::ZERO {
        return Err(FairValueError::MissingInput(RequiredInput::Shares));
    }

    let total_long_term_debt = input.total_long_term_debt();

    // --- Cost of debt ---
    let (cost_of_debt_pretax, after_tax_cost_of_debt) = if total_long_term_debt > Decimal::ZERO {
        let interest = input.interest_expense.ok_or(FairValueError::MissingInput(
            RequiredInput::Item(LineItem::InterestExpense),
        ))?;
        let kd = interest / total_long_term_debt;
        (kd, kd * (Decimal::ONE - input.effective_tax_rate))
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    // --- Cost of equity (CAPM) ---
    let cost_of_equity = input.risk_free_rate + input.beta * input.equity_risk_premium;

    // --- Capital weights ---
    let market_cap = share_price * shares_outstanding;
    let total_capital = total_long_term_debt + market_cap;
    if total_capital <= Decimal::ZERO {
        return Err(FairValueError::DivisionByZero {
            context: "capital structure weights".into(),
        });
    }
    let debt_weight = total_long_term_debt / total_capital;
    let equity_weight = Decimal::ONE - debt_weight;

    let wacc = debt_weight * after_tax_cost_of_debt + equity_weight * cost_of_equity;

    Ok(WaccOutput {
        wacc,
        cost_of_equity,
        cost_of_debt_pretax,
        after_tax_cost_of_debt,
        total_long_term_debt,
        market_cap,
        shares_outstanding,
        debt_weight,
        equity_weight,
    })
}

/// [`compute_wacc`] wrapped in the standard output envelope with
/// reasonableness warnings.
pub fn calculate_wacc(input: &WaccInput) -> FairValueResult<ComputationOutput<WaccOutput>> {
    let start = Instant::now();
    let output = compute_wacc(input)?;
    let warnings = wacc_warnings(input, &output);
    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "WACC from book debt and market equity (CAPM cost of equity)",
        input,
        warnings,
        elapsed,
        output,
    ))
}

fn wacc_warnings(input: &WaccInput, out: &WaccOutput) -> Vec<String> {
    let mut warnings = Vec::new();
    if input.beta > dec!(3.0) {
        warnings.push(format!(
            "High beta ({}): verify market data; betas above 3.0 are unusual",
            input.beta
        ));
    }
    if input.equity_risk_premium > dec!(0.10) {
        warnings.push(format!(
            "Equity risk premium ({}) exceeds 10%; verify estimate",
            input.equity_risk_premium
        ));
    }
    if out.wacc > dec!(0.20) {
        warnings.push(format!("WACC of {} exceeds 20%", out.wacc));
    }
    if input.effective_tax_rate < Decimal::ZERO || input.effective_tax_rate > Decimal::ONE {
        warnings.push(format!(
            "Effective tax rate ({}) is outside [0, 1]; reported tax and pretax income may be inconsistent",
            input.effective_tax_rate
        ));
    }
    warnings
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
