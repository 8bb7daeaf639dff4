use chrono::NaiveDate;
use fair_value_core::batch::{valuation_keys, BatchRunner, BatchSummary};
use fair_value_core::config::ValuationConfig;
use fair_value_core::data::{
    FinancialObservation, MarketSnapshot, ObservationStore, PriceHistory, RateBook, RateSeries,
    RateSeriesKind,
};
use fair_value_core::engine::{ValuationContext, ValuationOutcome, ValuationRecord};
use fair_value_core::sink::{Keyed, MemorySink, ResultSink};
use fair_value_core::valuation::growth::{
    GrowthFallbackTable, GrowthRateHistory, GrowthRateSource, ImpliedGrowthRate,
};
use fair_value_core::ValuationKey;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Two fiscal years of identical fundamentals. After-tax cost of debt equals
/// the cost of equity, so WACC is 9% whatever the share price.
fn store() -> ObservationStore {
    let mut rows = Vec::new();
    for year in [2020, 2021] {
        let end = date(year, 12, 31);
        for (concept, value) in [
            ("InterestExpense", dec!(22.78481012658227848101265823)),
            ("IncomeTaxExpenseBenefit", dec!(21)),
            (
                "IncomeLossFromContinuingOperationsBeforeIncomeTaxesMinorityInterestAndIncomeLossFromEquityMethodInvestments",
                dec!(100),
            ),
            ("LongTermDebtNoncurrent", dec!(200)),
            ("CommonStockSharesOutstanding", dec!(1000)),
            ("OperatingIncomeLoss", dec!(100)),
            ("NetCashProvidedByUsedInOperatingActivities", dec!(120)),
            ("NetIncomeLoss", dec!(80)),
            ("ShareBasedCompensation", dec!(5)),
            ("PaymentsToAcquirePropertyPlantAndEquipment", dec!(10)),
            ("CashAndCashEquivalentsAtCarryingValue", dec!(50)),
            ("CurrentDebt", dec!(10)),
        ] {
            rows.push(FinancialObservation::new("ACME", concept, year, value).with_period_end(end));
        }
    }
    ObservationStore::new(rows)
}

fn rates() -> RateBook {
    RateBook::new()
        .with_series(RateSeriesKind::RiskFree, RateSeries::new([(date(2015, 1, 1), dec!(0.04))]))
        .with_series(
            RateSeriesKind::EquityRiskPremium,
            RateSeries::new([(date(2015, 1, 1), dec!(0.05))]),
        )
        .with_series(
            RateSeriesKind::AnalystGrowth,
            RateSeries::new([(date(2015, 1, 1), dec!(0.05))]),
        )
}

fn market() -> MarketSnapshot {
    MarketSnapshot::new()
        .with_prices(
            "ACME",
            PriceHistory::new([(date(2020, 12, 31), dec!(1.8)), (date(2021, 12, 31), dec!(2))]),
        )
        .with_beta("ACME", dec!(1))
}

#[test]
fn test_calibrate_then_value_with_one_year_lag() {
    let store = store();
    let rates = rates();
    let market = market();
    let ctx = ValuationContext::new(&store, &rates, &market, ValuationConfig::default());
    let keys = valuation_keys(&store, &ctx.config().years());
    assert_eq!(keys.len(), 2);

    let calibrated = BatchRunner::new(&ctx).calibrate_all(&keys);
    assert_eq!(calibrated.len(), 2);
    // Higher price for the same fundamentals implies higher growth
    let g2020 = calibrated[&keys[0]].rate;
    let g2021 = calibrated[&keys[1]].rate;
    assert!(g2020 < g2021, "{g2020} vs {g2021}");
    assert!(g2021 < dec!(0.09));

    let ctx = ctx.with_growth_history(GrowthRateHistory::new(calibrated.into_values()));
    let valued = BatchRunner::new(&ctx).value_all(&keys);

    // 2020 has no calibration a year back: falls through to the default
    match &valued[&keys[0]].outcome {
        ValuationOutcome::Valued { detail, .. } => {
            assert_eq!(detail.perpetual_growth.source, GrowthRateSource::Default)
        }
        other => panic!("expected Valued, got {other:?}"),
    }

    // 2021 uses the 2020 calibration, so it reproduces the 2020 price
    match &valued[&keys[1]].outcome {
        ValuationOutcome::Valued {
            intrinsic_value,
            detail,
        } => {
            assert_eq!(
                detail.perpetual_growth.source,
                GrowthRateSource::Calibrated {
                    date: date(2020, 12, 31)
                }
            );
            assert_eq!(detail.perpetual_growth.rate, g2020);
            assert!(
                (*intrinsic_value - dec!(1.8)).abs() < dec!(0.0001),
                "IV = {intrinsic_value}"
            );
        }
        other => panic!("expected Valued, got {other:?}"),
    }

    let summary = BatchSummary::from_valuations(valued.values());
    assert_eq!(summary.valued, 2);
    assert_eq!(summary.failed, 0);
}

#[test]
fn test_fallback_table_never_feeds_back_same_year_calibrations() {
    let store = store();
    let rates = rates();
    let market = market();
    let ctx = ValuationContext::new(&store, &rates, &market, ValuationConfig::default());
    let keys = valuation_keys(&store, &ctx.config().years());

    let calibrated = BatchRunner::new(&ctx).calibrate_all(&keys);
    let g2020 = calibrated[&keys[0]].rate;
    let rows: Vec<ImpliedGrowthRate> = calibrated.into_values().collect();
    let table = GrowthFallbackTable::from_implied_rates(&rows, dec!(0.5), Decimal::ONE).unwrap();
    assert_eq!(table.years().count(), 2);

    // No per-entity history: only the table can supply a rate
    let ctx = ctx.with_fallback_table(table);
    let valued = BatchRunner::new(&ctx).value_all(&keys);

    match &valued[&keys[0]].outcome {
        ValuationOutcome::Valued { detail, .. } => {
            assert_eq!(detail.perpetual_growth.source, GrowthRateSource::Default)
        }
        other => panic!("expected Valued, got {other:?}"),
    }

    match &valued[&keys[1]].outcome {
        ValuationOutcome::Valued {
            intrinsic_value,
            detail,
        } => {
            assert_eq!(
                detail.perpetual_growth.source,
                GrowthRateSource::YearTable { year: 2020 }
            );
            assert_eq!(detail.perpetual_growth.rate, g2020);
            // Reproduces last year's price, not this year's
            assert!((*intrinsic_value - dec!(1.8)).abs() < dec!(0.0001));
            assert!((*intrinsic_value - dec!(2)).abs() > dec!(0.1));
        }
        other => panic!("expected Valued, got {other:?}"),
    }
}

#[test]
fn test_fallback_table_from_calibrations() {
    let rows = vec![
        ImpliedGrowthRate::new("AAA", date(2020, 12, 31), dec!(0.01)),
        ImpliedGrowthRate::new("BBB", date(2020, 12, 31), dec!(0.03)),
        ImpliedGrowthRate::new("CCC", date(2020, 12, 31), dec!(2.5)),
        ImpliedGrowthRate::new("AAA", date(2021, 12, 31), dec!(0.04)),
    ];
    let table = GrowthFallbackTable::from_implied_rates(&rows, dec!(0.5), Decimal::ONE).unwrap();
    let years: Vec<(i32, Decimal)> = table.years().collect();
    assert_eq!(years, vec![(2020, dec!(0.02)), (2021, dec!(0.04))]);
    assert_eq!(table.global_mean(), Some(dec!(0.03)));
}

#[test]
fn test_rerun_replaces_previous_results() {
    let store = store();
    let rates = rates();
    let market = MarketSnapshot::new();
    let ctx = ValuationContext::new(&store, &rates, &market, ValuationConfig::default());
    let keys = valuation_keys(&store, &(2021..=2021));

    let mut sink: MemorySink<ValuationRecord> = MemorySink::new();
    let first: Vec<_> = BatchRunner::new(&ctx)
        .value_all(&keys)
        .values()
        .map(|v| v.to_record())
        .collect();
    sink.upsert(first).unwrap();
    let key = ValuationKey::new("ACME", date(2021, 12, 31));
    assert_eq!(
        sink.get(&key).and_then(|r| r.error_message.clone()),
        Some("Error: missing beta".to_string())
    );

    let market = self::market();
    let ctx = ValuationContext::new(&store, &rates, &market, ValuationConfig::default());
    let second: Vec<_> = BatchRunner::new(&ctx)
        .value_all(&keys)
        .values()
        .map(|v| v.to_record())
        .collect();
    assert_eq!(sink.upsert(second).unwrap(), 1);
    let keys: Vec<ValuationKey> = sink.rows().map(|r| r.key()).collect();
    assert_eq!(keys, vec![key.clone()]);
    let record = sink.get(&key).unwrap();
    assert_eq!(record.error_message, None);
    assert!(record.intrinsic_value.is_some());
}
