use chrono::NaiveDate;
use fair_value_core::config::ValuationConfig;
use fair_value_core::data::{
    FinancialObservation, MarketSnapshot, ObservationStore, PriceHistory, RateBook, RateSeries,
    RateSeriesKind,
};
use fair_value_core::engine::{value_entity, ValuationContext, ValuationFailure, ValuationOutcome};
use fair_value_core::valuation::dcf::{self, DcfInput, EquityBridge};
use fair_value_core::valuation::fcff::{self, FcffInput};
use fair_value_core::valuation::growth::{
    GrowthFallbackTable, GrowthRateHistory, GrowthRateSource, ImpliedGrowthRate,
};
use fair_value_core::valuation::wacc::{self, WaccInput};
use fair_value_core::ValuationKey;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

/// Baseline intrinsic value per share for the reference company below.
const BASELINE_IV: Decimal = dec!(1.665849964707318622548504298);

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ===========================================================================
// Component tests
// ===========================================================================

#[test]
fn test_wacc_us_industrial() {
    // Rf=4.2%, ERP=5.5%, Beta=1.10, LTD=300 at 5.5%, t=21%, market cap 700
    let input = WaccInput {
        risk_free_rate: dec!(0.042),
        equity_risk_premium: dec!(0.055),
        beta: dec!(1.10),
        interest_expense: Some(dec!(16.5)),
        effective_tax_rate: dec!(0.21),
        long_term_debt: Some(dec!(300)),
        long_term_lease: None,
        share_price: Some(dec!(7)),
        common_shares: Some(dec!(100)),
        preferred_shares: None,
    };
    let result = wacc::calculate_wacc(&input).unwrap();
    // 0.3 * 0.04345 + 0.7 * 0.1025 = 0.084785
    assert_eq!(result.result.debt_weight, dec!(0.3));
    assert_eq!(result.result.wacc, dec!(0.084785));
    assert!(result.warnings.is_empty());
}

#[test]
fn test_reference_company_dcf_baseline() {
    let projection = fcff::project_fcff(&FcffInput {
        operating_income: Some(dec!(100)),
        effective_tax_rate: dec!(0.21),
        operating_cash_flow: Some(dec!(120)),
        net_income: Some(dec!(80)),
        stock_based_compensation: Some(dec!(5)),
        capex: Some(dec!(10)),
        growth_rate: dec!(0.05),
    })
    .unwrap();
    assert_eq!(projection.fcff, dec!(104));

    let out = dcf::discount(&DcfInput {
        projected_fcff: projection.projected_flows(),
        wacc: dec!(0.09),
        perpetual_growth_rate: dec!(0.025),
        bridge: EquityBridge {
            cash_and_equivalents: Some(dec!(50)),
            current_debt: Some(dec!(10)),
            total_long_term_debt: dec!(200),
        },
        shares_outstanding: dec!(1000),
    })
    .unwrap();

    assert_eq!(out.terminal_value, dec!(2093.1017625));
    assert!(
        (out.enterprise_value - dec!(1825.849964707318622548504298)).abs() < dec!(0.000000001),
        "EV = {}",
        out.enterprise_value
    );
    assert!(
        (out.intrinsic_value_per_share - BASELINE_IV).abs() < dec!(0.000000000001),
        "IV = {}",
        out.intrinsic_value_per_share
    );
}

// ===========================================================================
// End-to-end through the engine
// ===========================================================================

struct Fixture {
    store: ObservationStore,
    rates: RateBook,
    market: MarketSnapshot,
}

impl Fixture {
    fn reference() -> Self {
        Self::with_rows(reference_rows())
    }

    fn with_rows(rows: Vec<(&'static str, Decimal)>) -> Self {
        let as_of = date(2021, 12, 31);
        let store = ObservationStore::new(rows.into_iter().map(|(concept, value)| {
            FinancialObservation::new("ACME", concept, 2021, value).with_period_end(as_of)
        }));
        let rates = RateBook::new()
            .with_series(RateSeriesKind::RiskFree, RateSeries::new([(date(2021, 9, 30), dec!(0.04))]))
            .with_series(
                RateSeriesKind::EquityRiskPremium,
                RateSeries::new([(date(2021, 1, 1), dec!(0.05))]),
            )
            .with_series(
                RateSeriesKind::AnalystGrowth,
                RateSeries::new([(date(2021, 1, 1), dec!(0.05)), (date(2022, 1, 1), dec!(0.5))]),
            );
        let market = MarketSnapshot::new()
            .with_prices("ACME", PriceHistory::new([(date(2021, 12, 31), dec!(2))]))
            .with_beta("ACME", dec!(1));
        Self {
            store,
            rates,
            market,
        }
    }

    fn context(&self) -> ValuationContext<'_> {
        ValuationContext::new(&self.store, &self.rates, &self.market, ValuationConfig::default())
    }
}

/// Debt costs exactly the 9% cost of equity after tax, so WACC is 9%.
fn reference_rows() -> Vec<(&'static str, Decimal)> {
    vec![
        ("InterestExpense", dec!(22.78481012658227848101265823)),
        ("IncomeTaxExpenseBenefit", dec!(21)),
        (
            "IncomeLossFromContinuingOperationsBeforeIncomeTaxesMinorityInterestAndIncomeLossFromEquityMethodInvestments",
            dec!(100),
        ),
        ("LongTermDebtNoncurrent", dec!(150)),
        ("CapitalLeaseObligationsNoncurrent", dec!(50)),
        ("CommonStockSharesOutstanding", dec!(900)),
        ("PreferredStockSharesOutstanding", dec!(100)),
        ("OperatingIncomeLoss", dec!(100)),
        ("NetCashProvidedByUsedInOperatingActivities", dec!(120)),
        ("NetIncomeLoss", dec!(80)),
        ("ShareBasedCompensation", dec!(5)),
        ("PaymentsToAcquirePropertyPlantAndEquipment", dec!(10)),
        ("CashAndCashEquivalentsAtCarryingValue", dec!(50)),
        ("CurrentDebt", dec!(10)),
    ]
}

fn reference_history() -> GrowthRateHistory {
    GrowthRateHistory::new([
        ImpliedGrowthRate::new("ACME", date(2020, 12, 31), dec!(0.025)),
        // Same period as the valuation: must be ignored
        ImpliedGrowthRate::new("ACME", date(2021, 12, 31), dec!(0.08)),
    ])
}

#[test]
fn test_end_to_end_matches_baseline() {
    let fixture = Fixture::reference();
    let ctx = fixture.context().with_growth_history(reference_history());

    let valuation = value_entity(&ctx, &ValuationKey::new("ACME", date(2021, 12, 31)));
    match &valuation.outcome {
        ValuationOutcome::Valued {
            intrinsic_value,
            detail,
        } => {
            assert!((detail.wacc.wacc - dec!(0.09)).abs() < dec!(0.0000000000000001));
            assert_eq!(detail.fcff.fcff, dec!(104));
            assert_eq!(detail.perpetual_growth.rate, dec!(0.025));
            assert_eq!(
                detail.perpetual_growth.source,
                GrowthRateSource::Calibrated {
                    date: date(2020, 12, 31)
                }
            );
            assert!(
                (*intrinsic_value - BASELINE_IV).abs() < dec!(0.000000000001),
                "IV = {intrinsic_value}"
            );
        }
        ValuationOutcome::Failed { failure } => panic!("valuation failed: {failure}"),
    }

    let record = valuation.to_record();
    assert_eq!(record.share_price, Some(dec!(2)));
    assert_eq!(record.error_message, None);
}

#[test]
fn test_missing_operating_income_yields_no_value() {
    let rows = reference_rows()
        .into_iter()
        .filter(|(concept, _)| *concept != "OperatingIncomeLoss")
        .collect();
    let fixture = Fixture::with_rows(rows);
    let ctx = fixture.context().with_growth_history(reference_history());

    let record = value_entity(&ctx, &ValuationKey::new("ACME", date(2021, 12, 31))).to_record();
    assert_eq!(record.intrinsic_value, None);
    assert_eq!(
        record.error_message.as_deref(),
        Some("Error: missing operating income")
    );
}

#[test]
fn test_synonym_concepts_resolve() {
    let rows = reference_rows()
        .into_iter()
        .map(|(concept, value)| match concept {
            "NetIncomeLoss" => ("ProfitLoss", value),
            "InterestExpense" => ("InterestIncomeExpenseNonoperatingNet", value),
            _ => (concept, value),
        })
        .collect();
    let fixture = Fixture::with_rows(rows);
    let ctx = fixture.context().with_growth_history(reference_history());

    let valuation = value_entity(&ctx, &ValuationKey::new("ACME", date(2021, 12, 31)));
    let iv = valuation.outcome.intrinsic_value().expect("valued");
    assert!((iv - BASELINE_IV).abs() < dec!(0.000000000001));
}

#[test]
fn test_duplicate_rows_surface_as_data_integrity_failure() {
    let mut rows = reference_rows();
    rows.push(("NetCashProvidedByUsedInOperatingActivities", dec!(121)));
    let fixture = Fixture::with_rows(rows);
    let ctx = fixture.context();

    let valuation = value_entity(&ctx, &ValuationKey::new("ACME", date(2021, 12, 31)));
    let failure = valuation.outcome.failure().expect("failed");
    assert!(failure.is_data_integrity());
    assert!(matches!(
        failure,
        ValuationFailure::AmbiguousObservation { concept, fiscal_year: 2021, count: 2, .. }
            if concept == "NetCashProvidedByUsedInOperatingActivities"
    ));
}

#[test]
fn test_growth_rate_lookup_never_reads_the_future() {
    // AnalystGrowth jumps to 50% on 2022-01-01, after the valuation date
    let fixture = Fixture::reference();
    let ctx = fixture.context().with_growth_history(reference_history());
    let inputs = ctx
        .resolve_inputs(&ValuationKey::new("ACME", date(2021, 12, 31)))
        .unwrap();
    assert_eq!(inputs.fcff_growth_rate, Some(dec!(0.05)));
}

#[test]
fn test_fallback_table_used_without_lagged_calibration() {
    let fixture = Fixture::reference();
    // The 2021 entry covers the valuation year itself and must not be read
    let table = GrowthFallbackTable::new(BTreeMap::from([(2020, dec!(0.025)), (2021, dec!(0.08))]));
    let history = GrowthRateHistory::new([ImpliedGrowthRate::new(
        "ACME",
        date(2021, 12, 31),
        dec!(0.08),
    )]);
    let ctx = fixture
        .context()
        .with_growth_history(history)
        .with_fallback_table(table);

    let valuation = value_entity(&ctx, &ValuationKey::new("ACME", date(2021, 12, 31)));
    match &valuation.outcome {
        ValuationOutcome::Valued {
            intrinsic_value,
            detail,
        } => {
            assert_eq!(
                detail.perpetual_growth.source,
                GrowthRateSource::YearTable { year: 2020 }
            );
            assert!((*intrinsic_value - BASELINE_IV).abs() < dec!(0.000000000001));
        }
        ValuationOutcome::Failed { failure } => panic!("valuation failed: {failure}"),
    }
}

#[test]
fn test_growth_at_or_above_wacc_fails_the_row() {
    let fixture = Fixture::reference();
    let history = GrowthRateHistory::new([ImpliedGrowthRate::new(
        "ACME",
        date(2020, 12, 31),
        dec!(0.095),
    )]);
    let ctx = fixture.context().with_growth_history(history);

    let valuation = value_entity(&ctx, &ValuationKey::new("ACME", date(2021, 12, 31)));
    match valuation.outcome.failure() {
        Some(ValuationFailure::DivergentTerminalValue { growth, wacc }) => {
            assert_eq!(*growth, dec!(0.095));
            assert!((*wacc - dec!(0.09)).abs() < dec!(0.0000000000000001));
        }
        other => panic!("expected DivergentTerminalValue, got {other:?}"),
    }
    assert!(!valuation.outcome.failure().unwrap().is_data_integrity());

    let record = valuation.to_record();
    assert_eq!(record.intrinsic_value, None);
    assert_eq!(record.share_price, Some(dec!(2)));
    let message = record.error_message.expect("error message");
    assert!(
        message.starts_with("Error: perpetual growth rate 0.095 is not below WACC "),
        "{message}"
    );
}
