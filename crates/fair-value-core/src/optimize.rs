//! Derivative-free scalar minimisation.
//!
//! [`minimize_bounded`] is Brent's method for a minimum on a closed interval:
//! golden-section steps for robustness, parabolic interpolation through the
//! three best points for speed once the function looks locally quadratic.
//! It never evaluates outside `[lower, upper]`, which lets callers keep a
//! singularity just past one bound out of reach.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::FairValueError;
use crate::FairValueResult;

/// (3 - sqrt(5)) / 2
const GOLDEN: Decimal = dec!(0.3819660112501051517954131656);
/// Relative tolerance floor, roughly sqrt of f64 machine epsilon.
const SQRT_EPS: Decimal = dec!(0.0000000149);
const HALF: Decimal = dec!(0.5);
const TWO: Decimal = dec!(2);
const THREE: Decimal = dec!(3);

/// Configuration for scalar minimisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinimizerConfig {
    /// Absolute tolerance on the abscissa.
    pub tolerance: Decimal,
    /// Maximum number of function evaluations.
    pub max_iterations: u32,
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self {
            tolerance: dec!(0.0000000001),
            max_iterations: 500,
        }
    }
}

/// Result of a successful minimisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Minimum {
    /// Abscissa of the minimum.
    pub x: Decimal,
    /// Objective value at `x`.
    pub value: Decimal,
    /// Function evaluations used.
    pub evaluations: u32,
}

fn sign(x: Decimal) -> Decimal {
    if x < Decimal::ZERO {
        -Decimal::ONE
    } else {
        Decimal::ONE
    }
}

/// Minimise `f` on `[lower, upper]`.
///
/// `f` must return finite values everywhere on the interval; callers with a
/// pole nearby should clamp. Fails with `ConvergenceFailure` once
/// `config.max_iterations` evaluations are spent.
///
/// # Example
///
/// ```rust
/// use fair_value_core::optimize::{minimize_bounded, MinimizerConfig};
/// use rust_decimal::Decimal;
/// use rust_decimal_macros::dec;
///
/// let f = |x: Decimal| (x - dec!(2)) * (x - dec!(2));
/// let min = minimize_bounded(f, dec!(0), dec!(5), &MinimizerConfig::default()).unwrap();
/// assert!((min.x - dec!(2)).abs() < dec!(0.000001));
/// ```
#[allow(clippy::many_single_char_names)]
pub fn minimize_bounded<F>(
    mut f: F,
    lower: Decimal,
    upper: Decimal,
    config: &MinimizerConfig,
) -> FairValueResult<Minimum>
where
    F: FnMut(Decimal) -> Decimal,
{
    if lower >= upper {
        return Err(FairValueError::InvalidInput {
            field: "bounds".into(),
            reason: format!("Lower bound ({lower}) must be below upper bound ({upper})"),
        });
    }
    if config.tolerance <= Decimal::ZERO {
        return Err(FairValueError::InvalidInput {
            field: "tolerance".into(),
            reason: "Tolerance must be positive".into(),
        });
    }

    let (mut a, mut b) = (lower, upper);

    // xf: best point so far, nfc: second best, fulc: previous second best
    let mut fulc = a + GOLDEN * (b - a);
    let (mut nfc, mut xf) = (fulc, fulc);
    let mut rat = Decimal::ZERO;
    let mut e = Decimal::ZERO;
    let mut fx = f(xf);
    let mut evaluations: u32 = 1;
    let (mut ffulc, mut fnfc) = (fx, fx);

    let mut xm = HALF * (a + b);
    let mut tol1 = SQRT_EPS * xf.abs() + config.tolerance / THREE;
    let mut tol2 = TWO * tol1;

    while (xf - xm).abs() > tol2 - HALF * (b - a) {
        if evaluations >= config.max_iterations {
            return Err(FairValueError::ConvergenceFailure {
                function: "bounded Brent minimisation".into(),
                iterations: evaluations,
                last_delta: b - a,
            });
        }

        let mut golden = true;

        if e.abs() > tol1 {
            golden = false;
            let mut r = (xf - nfc) * (fx - ffulc);
            let mut q = (xf - fulc) * (fx - fnfc);
            let mut p = (xf - fulc) * q - (xf - nfc) * r;
            q = TWO * (q - r);
            if q > Decimal::ZERO {
                p = -p;
            }
            q = q.abs();
            r = e;
            e = rat;

            // Parabola must be well inside the bracket and shrink the step
            if p.abs() < (HALF * q * r).abs() && p > q * (a - xf) && p < q * (b - xf) {
                rat = p / q;
                let x = xf + rat;
                if (x - a) < tol2 || (b - x) < tol2 {
                    rat = tol1 * sign(xm - xf);
                }
            } else {
                golden = true;
            }
        }

        if golden {
            e = if xf >= xm { a - xf } else { b - xf };
            rat = GOLDEN * e;
        }

        let x = xf + sign(rat) * rat.abs().max(tol1);
        let fu = f(x);
        evaluations += 1;

        if fu <= fx {
            if x >= xf {
                a = xf;
            } else {
                b = xf;
            }
            fulc = nfc;
            ffulc = fnfc;
            nfc = xf;
            fnfc = fx;
            xf = x;
            fx = fu;
        } else {
            if x < xf {
                a = x;
            } else {
                b = x;
            }
            if fu <= fnfc || nfc == xf {
                fulc = nfc;
                ffulc = fnfc;
                nfc = x;
                fnfc = fu;
            } else if fu <= ffulc || fulc == xf || fulc == nfc {
                fulc = x;
                ffulc = fu;
            }
        }

        xm = HALF * (a + b);
        tol1 = SQRT_EPS * xf.abs() + config.tolerance / THREE;
        tol2 = TWO * tol1;
    }

    Ok(Minimum {
        x: xf,
        value: fx,
        evaluations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quadratic_minimum() {
        let f = |x: Decimal| (x - dec!(2)) * (x - dec!(2)) + dec!(1);
        let min = minimize_bounded(f, dec!(0), dec!(5), &MinimizerConfig::default()).unwrap();
        assert!((min.x - dec!(2)).abs() < dec!(0.0000001), "x = {}", min.x);
        assert!((min.value - dec!(1)).abs() < dec!(0.0000000001));
    }

    #[test]
    fn test_absolute_value_kink() {
        // Non-smooth at the minimum, like a price-matching objective
        let f = |x: Decimal| (x - dec!(0.031)).abs();
        let min = minimize_bounded(f, dec!(-1), dec!(0.08), &MinimizerConfig::default()).unwrap();
        assert!((min.x - dec!(0.031)).abs() < dec!(0.000001), "x = {}", min.x);
    }

    #[test]
    fn test_minimum_at_bound() {
        let f = |x: Decimal| x;
        let min = minimize_bounded(f, dec!(1), dec!(3), &MinimizerConfig::default()).unwrap();
        assert!((min.x - dec!(1)).abs() < dec!(0.00001), "x = {}", min.x);
        assert!(min.x >= dec!(1));
    }

    #[test]
    fn test_never_evaluates_outside_bounds() {
        let lower = dec!(-0.5);
        let upper = dec!(0.0899);
        let f = |x: Decimal| {
            assert!(x >= lower && x <= upper, "evaluated at {x}");
            (x - dec!(0.2)).abs()
        };
        let min = minimize_bounded(f, lower, upper, &MinimizerConfig::default()).unwrap();
        assert!(min.x <= upper);
    }

    #[test]
    fn test_iteration_budget_exhausted() {
        let f = |x: Decimal| (x - dec!(2)) * (x - dec!(2));
        let config = MinimizerConfig {
            tolerance: dec!(0.0000000001),
            max_iterations: 3,
        };
        match minimize_bounded(f, dec!(0), dec!(5), &config) {
            Err(FairValueError::ConvergenceFailure { iterations, .. }) => assert_eq!(iterations, 3),
            other => panic!("Expected ConvergenceFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let f = |x: Decimal| x;
        assert!(minimize_bounded(f, dec!(1), dec!(1), &MinimizerConfig::default()).is_err());
        assert!(minimize_bounded(f, dec!(2), dec!(1), &MinimizerConfig::default()).is_err());
    }
}
