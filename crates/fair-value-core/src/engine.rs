//! Per-(entity, date) valuation boundary.
//!
//! [`value_entity`] turns one [`ValuationKey`] into a [`Valuation`]: inputs are
//! resolved from the injected providers, required fields are checked in a
//! fixed order, and every failure is converted into a [`ValuationFailure`]
//! rather than propagated. [`calibrate_entity`] runs the same pipeline but
//! solves for the growth rate implied by the market price instead.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::ValuationConfig;
use crate::data::concepts::{ConceptTable, LineItem};
use crate::data::market::MarketData;
use crate::data::observations::ObservationSource;
use crate::data::rates::{RateProvider, RateSeriesKind};
use crate::error::{FairValueError, RequiredInput};
use crate::types::{EntityId, Money, Rate, Shares, ValuationKey};
use crate::valuation::calibration::{calibrate_growth_rate, CalibrationInput};
use crate::valuation::dcf::{discount, DcfInput, DcfOutput, EquityBridge};
use crate::valuation::fcff::{project_fcff, FcffInput, FcffOutput};
use crate::valuation::growth::{
    resolve_perpetual_growth, GrowthFallbackTable, GrowthRateHistory, ImpliedGrowthRate,
    ResolvedGrowthRate,
};
use crate::valuation::wacc::{compute_wacc, effective_tax_rate, WaccInput, WaccOutput};
use crate::FairValueResult;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Read-only providers and settings shared by every evaluation in a run.
pub struct ValuationContext<'a> {
    observations: &'a (dyn ObservationSource + Sync),
    rates: &'a (dyn RateProvider + Sync),
    market: &'a (dyn MarketData + Sync),
    concepts: ConceptTable,
    growth_history: GrowthRateHistory,
    fallback_table: GrowthFallbackTable,
    config: ValuationConfig,
}

impl<'a> ValuationContext<'a> {
    pub fn new(
        observations: &'a (dyn ObservationSource + Sync),
        rates: &'a (dyn RateProvider + Sync),
        market: &'a (dyn MarketData + Sync),
        config: ValuationConfig,
    ) -> Self {
        Self {
            observations,
            rates,
            market,
            concepts: config.concept_table(),
            growth_history: GrowthRateHistory::default(),
            fallback_table: GrowthFallbackTable::default(),
            config,
        }
    }

    /// Calibrated growth rates consulted (lagged) in valuation mode.
    pub fn with_growth_history(mut self, history: GrowthRateHistory) -> Self {
        self.growth_history = history;
        self
    }

    pub fn with_fallback_table(mut self, table: GrowthFallbackTable) -> Self {
        self.fallback_table = table;
        self
    }

    pub fn config(&self) -> &ValuationConfig {
        &self.config
    }

    fn item(&self, entity: &str, item: LineItem, fiscal_year: i32) -> FairValueResult<Option<Decimal>> {
        self.concepts
            .resolve(self.observations, entity, item, fiscal_year)
    }

    fn rate(&self, series: RateSeriesKind, date: NaiveDate) -> FairValueResult<Option<Rate>> {
        match self.rates.rate_at(series, date) {
            Ok(rate) => Ok(Some(rate)),
            Err(FairValueError::MissingRate { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Gather every input for one evaluation. Absent values stay `None`;
    /// only ambiguous observations are errors at this stage.
    pub fn resolve_inputs(&self, key: &ValuationKey) -> FairValueResult<ValuationInputs> {
        let entity = key.entity.as_str();
        let year = key.as_of.year();

        Ok(ValuationInputs {
            interest_expense: self.item(entity, LineItem::InterestExpense, year)?,
            income_tax: self.item(entity, LineItem::IncomeTax, year)?,
            pretax_income: self.item(entity, LineItem::PretaxIncome, year)?,
            long_term_debt: self.item(entity, LineItem::LongTermDebt, year)?,
            long_term_lease: self.item(entity, LineItem::LongTermLease, year)?,
            beta: self.market.beta(entity),
            risk_free_rate: self.rate(RateSeriesKind::RiskFree, key.as_of)?,
            equity_risk_premium: self.rate(RateSeriesKind::EquityRiskPremium, key.as_of)?,
            share_price: self.market.share_price_at(entity, key.as_of),
            common_shares: self.item(entity, LineItem::CommonShares, year)?,
            preferred_shares: self.item(entity, LineItem::PreferredShares, year)?,
            operating_income: self.item(entity, LineItem::OperatingIncome, year)?,
            operating_cash_flow: self.item(entity, LineItem::OperatingCashFlow, year)?,
            net_income: self.item(entity, LineItem::NetIncome, year)?,
            stock_based_compensation: self.item(entity, LineItem::StockCompensation, year)?,
            capex: self.item(entity, LineItem::Capex, year)?,
            cash_and_equivalents: self.item(entity, LineItem::Cash, year)?,
            current_debt: self.item(entity, LineItem::CurrentDebt, year)?,
            fcff_growth_rate: self.rate(RateSeriesKind::AnalystGrowth, key.as_of)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Everything one (entity, date) evaluation reads. Absent is not zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValuationInputs {
    pub interest_expense: Option<Money>,
    pub income_tax: Option<Money>,
    pub pretax_income: Option<Money>,
    pub long_term_debt: Option<Money>,
    pub long_term_lease: Option<Money>,
    pub beta: Option<Decimal>,
    pub risk_free_rate: Option<Rate>,
    pub equity_risk_premium: Option<Rate>,
    pub share_price: Option<Money>,
    pub common_shares: Option<Shares>,
    pub preferred_shares: Option<Shares>,
    pub operating_income: Option<Money>,
    pub operating_cash_flow: Option<Money>,
    pub net_income: Option<Money>,
    pub stock_based_compensation: Option<Money>,
    pub capex: Option<Money>,
    pub cash_and_equivalents: Option<Money>,
    pub current_debt: Option<Money>,
    /// Explicit-horizon FCFF growth (analyst estimate)
    pub fcff_growth_rate: Option<Rate>,
}

impl ValuationInputs {
    fn total_long_term_debt(&self) -> Money {
        self.long_term_debt.unwrap_or(Decimal::ZERO) + self.long_term_lease.unwrap_or(Decimal::ZERO)
    }

    fn shares_outstanding(&self) -> Shares {
        self.common_shares.unwrap_or(Decimal::ZERO) + self.preferred_shares.unwrap_or(Decimal::ZERO)
    }
}

fn require(value: Option<Decimal>, input: RequiredInput) -> FairValueResult<Decimal> {
    value.ok_or(FairValueError::MissingInput(input))
}

fn require_rate(value: Option<Rate>, series: RateSeriesKind, date: NaiveDate) -> FairValueResult<Rate> {
    value.ok_or(FairValueError::MissingRate { series, date })
}

/// WACC and FCFF projection, shared by valuation and calibration.
struct Prepared {
    share_price: Money,
    wacc: WaccOutput,
    fcff: FcffOutput,
    bridge: EquityBridge,
}

fn prepare(inputs: &ValuationInputs, as_of: NaiveDate) -> FairValueResult<Prepared> {
    let beta = require(inputs.beta, RequiredInput::Beta)?;
    let share_price = inputs
        .share_price
        .filter(|p| *p > Decimal::ZERO)
        .ok_or(FairValueError::MissingInput(RequiredInput::SharePrice))?;
    if inputs.shares_outstanding() <= Decimal::ZERO {
        return Err(FairValueError::MissingInput(RequiredInput::Shares));
    }
    let operating_income = require(inputs.operating_income, RequiredInput::OperatingIncome)?;

    let income_tax = require(inputs.income_tax, RequiredInput::Item(LineItem::IncomeTax))?;
    let pretax_income = require(inputs.pretax_income, RequiredInput::Item(LineItem::PretaxIncome))?;
    let operating_cash_flow = require(
        inputs.operating_cash_flow,
        RequiredInput::Item(LineItem::OperatingCashFlow),
    )?;
    let net_income = require(inputs.net_income, RequiredInput::Item(LineItem::NetIncome))?;
    if inputs.total_long_term_debt() > Decimal::ZERO {
        require(
            inputs.interest_expense,
            RequiredInput::Item(LineItem::InterestExpense),
        )?;
    }

    let risk_free_rate = require_rate(inputs.risk_free_rate, RateSeriesKind::RiskFree, as_of)?;
    let equity_risk_premium = require_rate(
        inputs.equity_risk_premium,
        RateSeriesKind::EquityRiskPremium,
        as_of,
    )?;
    let growth_rate = require_rate(inputs.fcff_growth_rate, RateSeriesKind::AnalystGrowth, as_of)?;

    let tax_rate = effective_tax_rate(income_tax, pretax_income)?;

    let wacc = compute_wacc(&WaccInput {
        risk_free_rate,
        equity_risk_premium,
        beta,
        interest_expense: inputs.interest_expense,
        effective_tax_rate: tax_rate,
        long_term_debt: inputs.long_term_debt,
        long_term_lease: inputs.long_term_lease,
        share_price: Some(share_price),
        common_shares: inputs.common_shares,
        preferred_shares: inputs.preferred_shares,
    })?;

    let fcff = project_fcff(&FcffInput {
        operating_income: Some(operating_income),
        effective_tax_rate: tax_rate,
        operating_cash_flow: Some(operating_cash_flow),
        net_income: Some(net_income),
        stock_based_compensation: inputs.stock_based_compensation,
        capex: inputs.capex,
        growth_rate,
    })?;

    let bridge = EquityBridge {
        cash_and_equivalents: inputs.cash_and_equivalents,
        current_debt: inputs.current_debt,
        total_long_term_debt: wacc.total_long_term_debt,
    };

    Ok(Prepared {
        share_price,
        wacc,
        fcff,
        bridge,
    })
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a valuation produced no intrinsic value. None of these are retried.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValuationFailure {
    #[error("Error: missing beta")]
    MissingBeta,

    #[error("Error: missing share price")]
    MissingSharePrice,

    #[error("Error: shares outstanding are zero or missing")]
    MissingShares,

    #[error("Error: missing operating income")]
    MissingOperatingIncome,

    #[error("Error: missing {item}")]
    MissingInput { item: LineItem },

    #[error("Error: no {series} rate at or before {date}")]
    MissingRate { series: RateSeriesKind, date: NaiveDate },

    #[error("Error: division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Error: perpetual growth rate {growth} is not below WACC {wacc}")]
    DivergentTerminalValue { growth: Rate, wacc: Rate },

    #[error("Error: {count} observations of {concept} for {entity} in {fiscal_year}")]
    AmbiguousObservation {
        entity: EntityId,
        concept: String,
        fiscal_year: i32,
        count: usize,
    },

    #[error("Error: {message}")]
    Computation { message: String },
}

impl ValuationFailure {
    /// Conflicting source data, as opposed to data that is merely absent.
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, ValuationFailure::AmbiguousObservation { .. })
    }
}

impl From<FairValueError> for ValuationFailure {
    fn from(e: FairValueError) -> Self {
        match e {
            FairValueError::MissingInput(RequiredInput::Beta) => ValuationFailure::MissingBeta,
            FairValueError::MissingInput(RequiredInput::SharePrice) => {
                ValuationFailure::MissingSharePrice
            }
            FairValueError::MissingInput(RequiredInput::Shares) => ValuationFailure::MissingShares,
            FairValueError::MissingInput(RequiredInput::OperatingIncome) => {
                ValuationFailure::MissingOperatingIncome
            }
            FairValueError::MissingInput(RequiredInput::Item(item)) => {
                ValuationFailure::MissingInput { item }
            }
            FairValueError::MissingRate { series, date } => {
                ValuationFailure::MissingRate { series, date }
            }
            FairValueError::DivisionByZero { context } => ValuationFailure::DivisionByZero { context },
            FairValueError::DivergentTerminalValue { growth, wacc } => {
                ValuationFailure::DivergentTerminalValue { growth, wacc }
            }
            FairValueError::AmbiguousObservation {
                entity,
                concept,
                fiscal_year,
                count,
            } => ValuationFailure::AmbiguousObservation {
                entity,
                concept,
                fiscal_year,
                count,
            },
            other => ValuationFailure::Computation {
                message: other.to_string(),
            },
        }
    }
}

/// Intermediate results behind a successful valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationDetail {
    pub wacc: WaccOutput,
    pub fcff: FcffOutput,
    pub perpetual_growth: ResolvedGrowthRate,
    pub dcf: DcfOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValuationOutcome {
    Valued {
        intrinsic_value: Money,
        detail: Box<ValuationDetail>,
    },
    Failed {
        failure: ValuationFailure,
    },
}

impl ValuationOutcome {
    pub fn intrinsic_value(&self) -> Option<Money> {
        match self {
            ValuationOutcome::Valued {
                intrinsic_value, ..
            } => Some(*intrinsic_value),
            ValuationOutcome::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&ValuationFailure> {
        match self {
            ValuationOutcome::Valued { .. } => None,
            ValuationOutcome::Failed { failure } => Some(failure),
        }
    }
}

/// Result of evaluating one key, with the observed price for comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Valuation {
    pub key: ValuationKey,
    pub share_price: Option<Money>,
    pub outcome: ValuationOutcome,
}

impl Valuation {
    pub fn to_record(&self) -> ValuationRecord {
        ValuationRecord {
            ticker: self.key.entity.clone(),
            date: self.key.as_of,
            intrinsic_value: self.outcome.intrinsic_value(),
            share_price: self.share_price,
            error_message: self.outcome.failure().map(ToString::to_string),
        }
    }
}

/// Flat, persisted shape of a valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationRecord {
    pub ticker: EntityId,
    pub date: NaiveDate,
    pub intrinsic_value: Option<Money>,
    pub share_price: Option<Money>,
    pub error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

fn run_valuation(
    ctx: &ValuationContext<'_>,
    key: &ValuationKey,
    inputs: &ValuationInputs,
) -> FairValueResult<ValuationOutcome> {
    let prepared = prepare(inputs, key.as_of)?;
    let perpetual_growth = resolve_perpetual_growth(
        &key.entity,
        key.as_of,
        &ctx.growth_history,
        &ctx.fallback_table,
        &ctx.config.growth_fallback,
    )?;

    let dcf = discount(&DcfInput {
        projected_fcff: prepared.fcff.projected_flows(),
        wacc: prepared.wacc.wacc,
        perpetual_growth_rate: perpetual_growth.rate,
        bridge: prepared.bridge,
        shares_outstanding: prepared.wacc.shares_outstanding,
    })?;

    Ok(ValuationOutcome::Valued {
        intrinsic_value: dcf.intrinsic_value_per_share,
        detail: Box::new(ValuationDetail {
            wacc: prepared.wacc,
            fcff: prepared.fcff,
            perpetual_growth,
            dcf,
        }),
    })
}

/// Value one (entity, date). Never fails: problems become a `Failed` outcome.
pub fn value_entity(ctx: &ValuationContext<'_>, key: &ValuationKey) -> Valuation {
    let (share_price, result) = match ctx.resolve_inputs(key) {
        Ok(inputs) => (inputs.share_price, run_valuation(ctx, key, &inputs)),
        Err(e) => (ctx.market.share_price_at(&key.entity, key.as_of), Err(e)),
    };

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => ValuationOutcome::Failed { failure: e.into() },
    };

    match &outcome {
        ValuationOutcome::Valued {
            intrinsic_value,
            detail,
        } => info!(
            ticker = %key.entity,
            date = %key.as_of,
            intrinsic_value = %intrinsic_value.round_dp(2),
            share_price = ?share_price,
            growth_source = %detail.perpetual_growth.source,
            "Valued"
        ),
        ValuationOutcome::Failed { failure } if failure.is_data_integrity() => error!(
            ticker = %key.entity,
            date = %key.as_of,
            error = %failure,
            "Ambiguous source data"
        ),
        ValuationOutcome::Failed { failure } => warn!(
            ticker = %key.entity,
            date = %key.as_of,
            reason = %failure,
            "Valuation failed"
        ),
    }

    Valuation {
        key: key.clone(),
        share_price,
        outcome,
    }
}

fn run_calibration(ctx: &ValuationContext<'_>, key: &ValuationKey) -> FairValueResult<ImpliedGrowthRate> {
    let inputs = ctx.resolve_inputs(key)?;
    let prepared = prepare(&inputs, key.as_of)?;

    let out = calibrate_growth_rate(
        &CalibrationInput {
            projected_fcff: prepared.fcff.projected_flows(),
            wacc: prepared.wacc.wacc,
            bridge: prepared.bridge,
            shares_outstanding: prepared.wacc.shares_outstanding,
            share_price: prepared.share_price,
        },
        &ctx.config.calibration,
    )?;

    debug!(
        ticker = %key.entity,
        date = %key.as_of,
        evaluations = out.evaluations,
        residual = %out.residual,
        "Calibration converged"
    );
    Ok(ImpliedGrowthRate::new(
        key.entity.clone(),
        key.as_of,
        out.implied_growth_rate,
    ))
}

/// Growth rate implied by the market price at one (entity, date), or `None`
/// when calibration is not possible there.
pub fn calibrate_entity(ctx: &ValuationContext<'_>, key: &ValuationKey) -> Option<ImpliedGrowthRate> {
    match run_calibration(ctx, key) {
        Ok(row) => {
            info!(
                ticker = %key.entity,
                date = %key.as_of,
                implied_growth_rate = %row.rate.round_dp(4),
                "Calibrated"
            );
            Some(row)
        }
        Err(e @ FairValueError::AmbiguousObservation { .. }) => {
            error!(ticker = %key.entity, date = %key.as_of, error = %e, "Ambiguous source data");
            None
        }
        Err(e) => {
            debug!(ticker = %key.entity, date = %key.as_of, reason = %e, "Calibration skipped");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
