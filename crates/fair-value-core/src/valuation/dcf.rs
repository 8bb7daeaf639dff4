use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{FairValueError, RequiredInput};
use crate::time_value::{npv, present_values};
use crate::types::{with_metadata, ComputationOutput, Money, Rate, Shares};
use crate::FairValueResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Balance-sheet items bridging enterprise value to equity value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquityBridge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_and_equivalents: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_debt: Option<Money>,
    /// Long-term debt plus long-term lease obligations
    #[serde(default)]
    pub total_long_term_debt: Money,
}

impl EquityBridge {
    /// Cash less all debt; added to enterprise value to reach equity value.
    pub fn residual(&self) -> Money {
        self.cash_and_equivalents.unwrap_or(Decimal::ZERO)
            - self.current_debt.unwrap_or(Decimal::ZERO)
            - self.total_long_term_debt
    }
}

/// Inputs for discounting an explicit FCFF projection plus a Gordon-growth
/// terminal value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfInput {
    /// Projected FCFF for years 1..=N
    pub projected_fcff: Vec<Money>,
    /// Discount rate
    pub wacc: Rate,
    /// Perpetual growth rate after the explicit horizon
    pub perpetual_growth_rate: Rate,
    #[serde(default)]
    pub bridge: EquityBridge,
    pub shares_outstanding: Shares,
}

/// Output of the DCF valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfOutput {
    /// Gordon-growth value of flows beyond the horizon, as of the final year
    pub terminal_value: Money,
    /// Sum of present values of explicit-period FCFFs
    pub pv_of_fcff: Money,
    /// Present value of terminal value
    pub pv_of_terminal: Money,
    /// NPV of [0, FCFF_1, .., FCFF_N + TV]
    pub enterprise_value: Money,
    /// Enterprise value + cash - current debt - long-term debt
    pub equity_value: Money,
    pub intrinsic_value_per_share: Money,
    /// Terminal value as a share of enterprise value
    pub terminal_value_pct: Rate,
    pub wacc_used: Rate,
    pub perpetual_growth_used: Rate,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Gordon growth terminal value: TV = FCFF_N * (1 + g) / (WACC - g).
///
/// Rejects `g >= wacc`, where the perpetuity diverges.
pub fn gordon_terminal_value(final_fcff: Money, growth: Rate, wacc: Rate) -> FairValueResult<Money> {
    let spread = wacc - growth;
    if spread <= Decimal::ZERO {
        return Err(FairValueError::DivergentTerminalValue { growth, wacc });
    }
    let multiplier = (Decimal::ONE + growth)
        .checked_div(spread)
        .ok_or_else(|| overflow("terminal value multiplier"))?;
    final_fcff
        .checked_mul(multiplier)
        .ok_or_else(|| overflow("terminal value"))
}

/// Discount the projection plus terminal value to an intrinsic value per share.
pub fn discount(input: &DcfInput) -> FairValueResult<DcfOutput> {
    let final_fcff = *input
        .projected_fcff
        .last()
        .ok_or_else(|| FairValueError::InsufficientData("No projected cash flows".into()))?;
    if input.shares_outstanding <= Decimal::ZERO {
        return Err(FairValueError::MissingInput(RequiredInput::Shares));
    }

    let terminal_value =
        gordon_terminal_value(final_fcff, input.perpetual_growth_rate, input.wacc)?;

    // Period 0 carries no flow, so discounting starts at year 1
    let mut flows = Vec::with_capacity(input.projected_fcff.len() + 1);
    flows.push(Decimal::ZERO);
    flows.extend_from_slice(&input.projected_fcff);
    let explicit_pvs = present_values(input.wacc, &flows)?;
    let pv_of_fcff: Money = explicit_pvs.iter().copied().sum();

    let last = flows.len() - 1;
    flows[last] = flows[last]
        .checked_add(terminal_value)
        .ok_or_else(|| overflow("final-year cash flow"))?;
    let enterprise_value = npv(input.wacc, &flows)?;
    let pv_of_terminal = enterprise_value - pv_of_fcff;

    let equity_value = enterprise_value + input.bridge.residual();
    let intrinsic_value_per_share = equity_value / input.shares_outstanding;

    let terminal_value_pct = if enterprise_value.is_zero() {
        Decimal::ZERO
    } else {
        pv_of_terminal / enterprise_value
    };

    Ok(DcfOutput {
        terminal_value,
        pv_of_fcff,
        pv_of_terminal,
        enterprise_value,
        equity_value,
        intrinsic_value_per_share,
        terminal_value_pct,
        wacc_used: input.wacc,
        perpetual_growth_used: input.perpetual_growth_rate,
    })
}

/// [`discount`] wrapped in the standard output envelope.
pub fn calculate_dcf(input: &DcfInput) -> FairValueResult<ComputationOutput<DcfOutput>> {
    let start = Instant::now();
    let output = discount(input)?;

    let mut warnings = Vec::new();
    if output.terminal_value_pct > dec!(0.75) {
        warnings.push(format!(
            "Terminal value represents {:.1}% of enterprise value",
            output.terminal_value_pct * dec!(100)
        ));
    }
    if output.equity_value < Decimal::ZERO {
        warnings.push("Debt exceeds enterprise value; equity value is negative".into());
    }
    if input.perpetual_growth_rate < Decimal::ZERO {
        warnings.push(format!(
            "Negative perpetual growth rate ({})",
            input.perpetual_growth_rate
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "5-year FCFF DCF with Gordon growth terminal value",
        input,
        warnings,
        elapsed,
        output,
    ))
}

fn overflow(context: &str) -> FairValueError {
    FairValueError::InvalidInput {
        field: context.into(),
        reason: "Value overflows decimal range".into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::MathematicalOps;
    use rust_decimal_macros::dec;

    fn sample_input() -> DcfInput {
        DcfInput {
            projected_fcff: vec![
                dec!(109.2),
                dec!(114.66),
                dec!(120.393),
                dec!(126.41265),
                dec!(132.7332825),
            ],
            wacc: dec!(0.09),
            perpetual_growth_rate: dec!(0.025),
            bridge: EquityBridge {
                cash_and_equivalents: Some(dec!(50)),
                current_debt: Some(dec!(10)),
                total_long_term_debt: dec!(200),
            },
            shares_outstanding: dec!(1000),
        }
    }

    #[test]
    fn test_gordon_terminal_value() {
        // 100 * 1.02 / 0.08 = 1275
        let tv = gordon_terminal_value(dec!(100), dec!(0.02), dec!(0.10)).unwrap();
        assert_eq!(tv, dec!(1275));
    }

    #[test]
    fn test_terminal_value_rejects_growth_at_or_above_wacc() {
        for g in [dec!(0.09), dec!(0.12)] {
            match gordon_terminal_value(dec!(100), g, dec!(0.09)) {
                Err(FairValueError::DivergentTerminalValue { growth, wacc }) => {
                    assert_eq!(growth, g);
                    assert_eq!(wacc, dec!(0.09));
                }
                other => panic!("Expected DivergentTerminalValue, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_terminal_value_increases_towards_wacc() {
        let wacc = dec!(0.09);
        let mut previous = Decimal::ZERO;
        let mut g = Decimal::ZERO;
        while g < dec!(0.089) {
            let tv = gordon_terminal_value(dec!(100), g, wacc).unwrap();
            assert!(tv > Decimal::ZERO);
            assert!(tv > previous, "TV at g={g} ({tv}) not above {previous}");
            previous = tv;
            g += dec!(0.004);
        }
    }

    #[test]
    fn test_equity_bridge_residual() {
        let bridge = sample_input().bridge;
        assert_eq!(bridge.residual(), dec!(-160));
        assert_eq!(EquityBridge::default().residual(), Decimal::ZERO);
    }

    #[test]
    fn test_discount_components_reconcile() {
        let out = discount(&sample_input()).unwrap();

        assert_eq!(out.enterprise_value, out.pv_of_fcff + out.pv_of_terminal);
        assert_eq!(out.equity_value, out.enterprise_value - dec!(160));
        assert_eq!(out.intrinsic_value_per_share, out.equity_value / dec!(1000));
        assert!(out.terminal_value_pct > Decimal::ZERO && out.terminal_value_pct < Decimal::ONE);
    }

    #[test]
    fn test_terminal_value_is_discounted_over_full_horizon() {
        let out = discount(&sample_input()).unwrap();
        let expected_pv = out.terminal_value / dec!(1.09).powi(5);
        assert!((out.pv_of_terminal - expected_pv).abs() < dec!(0.000001));
    }

    #[test]
    fn test_discount_rejects_zero_shares() {
        let mut input = sample_input();
        input.shares_outstanding = Decimal::ZERO;
        assert!(matches!(
            discount(&input),
            Err(FairValueError::MissingInput(RequiredInput::Shares))
        ));
    }

    #[test]
    fn test_discount_rejects_empty_projection() {
        let mut input = sample_input();
        input.projected_fcff.clear();
        assert!(matches!(
            discount(&input),
            Err(FairValueError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_calculate_dcf_warns_on_terminal_heavy_valuation() {
        let mut input = sample_input();
        input.perpetual_growth_rate = dec!(0.05);
        let result = calculate_dcf(&input).unwrap();
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("Terminal value represents")));
        assert_eq!(
            result.methodology,
            "5-year FCFF DCF with Gordon growth terminal value"
        );
    }
}
