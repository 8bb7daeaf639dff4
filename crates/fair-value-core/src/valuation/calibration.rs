use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{FairValueError, RequiredInput};
use crate::optimize::{minimize_bounded, MinimizerConfig};
use crate::types::{Money, Rate, Shares};
use crate::valuation::dcf::{discount, DcfInput, EquityBridge};
use crate::FairValueResult;

/// Objective value substituted where the DCF cannot be evaluated or the
/// price gap exceeds it, keeping parabolic-step arithmetic in range.
const OBJECTIVE_CEILING: Decimal = dec!(1000000000000000000);

/// Search settings for the implied perpetual growth rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Lowest growth rate considered
    pub lower_bound: Rate,
    /// Gap kept between the upper search bound and WACC
    pub singularity_margin: Rate,
    pub tolerance: Decimal,
    pub max_iterations: u32,
    /// Largest accepted |price - value| as a fraction of price
    pub max_relative_residual: Decimal,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            lower_bound: dec!(-1),
            singularity_margin: dec!(0.000001),
            tolerance: dec!(0.0000000001),
            max_iterations: 500,
            max_relative_residual: dec!(0.01),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationInput {
    /// Projected FCFF for years 1..=N
    pub projected_fcff: Vec<Money>,
    pub wacc: Rate,
    #[serde(default)]
    pub bridge: EquityBridge,
    pub shares_outstanding: Shares,
    /// Observed market price the valuation should reproduce
    pub share_price: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationOutput {
    pub implied_growth_rate: Rate,
    /// Intrinsic value per share at the implied rate
    pub intrinsic_value: Money,
    /// |price - intrinsic value|
    pub residual: Money,
    pub evaluations: u32,
}

/// Solve for the perpetual growth rate at which the DCF reproduces the
/// market price.
///
/// Searches `[lower_bound, wacc - singularity_margin]`, so the Gordon
/// singularity at `g = wacc` is never evaluated.
pub fn calibrate_growth_rate(
    input: &CalibrationInput,
    config: &CalibrationConfig,
) -> FairValueResult<CalibrationOutput> {
    if input.share_price <= Decimal::ZERO {
        return Err(FairValueError::MissingInput(RequiredInput::SharePrice));
    }
    let upper = input.wacc - config.singularity_margin;
    if upper <= config.lower_bound {
        return Err(FairValueError::InvalidInput {
            field: "wacc".into(),
            reason: format!(
                "WACC ({}) leaves no search interval above the lower bound ({})",
                input.wacc, config.lower_bound
            ),
        });
    }

    let mut dcf = DcfInput {
        projected_fcff: input.projected_fcff.clone(),
        wacc: input.wacc,
        perpetual_growth_rate: config.lower_bound,
        bridge: input.bridge.clone(),
        shares_outstanding: input.shares_outstanding,
    };
    // Fail early on inputs no growth rate can fix
    discount(&dcf)?;

    let price = input.share_price;
    let objective = |g: Rate| {
        dcf.perpetual_growth_rate = g;
        match discount(&dcf) {
            Ok(out) => (price - out.intrinsic_value_per_share)
                .abs()
                .min(OBJECTIVE_CEILING),
            Err(_) => OBJECTIVE_CEILING,
        }
    };

    let minimizer = MinimizerConfig {
        tolerance: config.tolerance,
        max_iterations: config.max_iterations,
    };
    let minimum = minimize_bounded(objective, config.lower_bound, upper, &minimizer)?;

    dcf.perpetual_growth_rate = minimum.x;
    let intrinsic_value = discount(&dcf)?.intrinsic_value_per_share;
    let residual = (price - intrinsic_value).abs();

    if residual > config.max_relative_residual * price {
        return Err(FairValueError::FinancialImpossibility(format!(
            "No growth rate in [{}, {upper}] reproduces price {price}; closest value {intrinsic_value} at g = {}",
            config.lower_bound, minimum.x
        )));
    }

    Ok(CalibrationOutput {
        implied_growth_rate: minimum.x,
        intrinsic_value,
        residual,
        evaluations: minimum.evaluations,
    })
}
