use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::concepts::LineItem;
use crate::error::{FairValueError, RequiredInput};
use crate::types::{Money, Rate};
use crate::FairValueResult;

/// Length of the explicit forecast horizon in years.
pub const PROJECTION_YEARS: u32 = 5;

/// Reported inputs for current-year free cash flow to the firm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcffInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_income: Option<Money>,
    pub effective_tax_rate: Rate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_cash_flow: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_income: Option<Money>,
    /// Share-based compensation; absent counts as zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_based_compensation: Option<Money>,
    /// Purchases of property, plant & equipment; absent counts as zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capex: Option<Money>,
    /// Annual FCFF growth over the explicit horizon
    pub growth_rate: Rate,
}

/// One projected year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcffYearProjection {
    pub year: u32,
    pub fcff: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcffOutput {
    pub after_tax_operating_income: Money,
    pub reinvestment: Money,
    /// Current-year FCFF
    pub fcff: Money,
    pub projections: Vec<FcffYearProjection>,
}

impl FcffOutput {
    /// Projected flows for years 1..=N in order.
    pub fn projected_flows(&self) -> Vec<Money> {
        self.projections.iter().map(|p| p.fcff).collect()
    }
}

/// Current-year FCFF = EBIT * (1 - t) + (CFO - NI - SBC) - CapEx.
pub fn current_fcff(input: &FcffInput) -> FairValueResult<(Money, Money, Money)> {
    let operating_income = input
        .operating_income
        .ok_or(FairValueError::MissingInput(RequiredInput::OperatingIncome))?;
    let operating_cash_flow = input.operating_cash_flow.ok_or(FairValueError::MissingInput(
        RequiredInput::Item(LineItem::OperatingCashFlow),
    ))?;
    let net_income = input.net_income.ok_or(FairValueError::MissingInput(
        RequiredInput::Item(LineItem::NetIncome),
    ))?;

    let after_tax_operating_income = operating_income * (Decimal::ONE - input.effective_tax_rate);

    let operations_part = operating_cash_flow
        - net_income
        - input.stock_based_compensation.unwrap_or(Decimal::ZERO);
    let reinvestment = operations_part - input.capex.unwrap_or(Decimal::ZERO);

    Ok((
        after_tax_operating_income,
        reinvestment,
        after_tax_operating_income + reinvestment,
    ))
}

/// Grow `base` at a constant rate: `base * (1 + g)^t` for t = 1..=years.
pub fn project(base: Money, growth_rate: Rate, years: u32) -> Vec<FcffYearProjection> {
    let factor = Decimal::ONE + growth_rate;
    let mut value = base;
    (1..=years)
        .map(|year| {
            value *= factor;
            FcffYearProjection { year, fcff: value }
        })
        .collect()
}

/// Current FCFF and its five-year projection.
pub fn project_fcff(input: &FcffInput) -> FairValueResult<FcffOutput> {
    let (after_tax_operating_income, reinvestment, fcff) = current_fcff(input)?;
    let projections = project(fcff, input.growth_rate, PROJECTION_YEARS);

    Ok(FcffOutput {
        after_tax_operating_income,
        reinvestment,
        fcff,
        projections,
    })
}
