use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::FairValueError;
use crate::types::{Money, Rate};
use crate::FairValueResult;

fn validate_rate(rate: Rate) -> FairValueResult<()> {
    if rate <= dec!(-1) {
        return Err(FairValueError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }
    Ok(())
}

/// Net Present Value of a series of cash flows.
///
/// The first flow sits at t = 0 and is not discounted, so a leading zero
/// discounts the remaining flows from year 1 onward.
pub fn npv(rate: Rate, cash_flows: &[Money]) -> FairValueResult<Money> {
    Ok(present_values(rate, cash_flows)?.into_iter().sum())
}

/// Present value of each flow individually, period `t` discounted by `(1 + rate)^t`.
pub fn present_values(rate: Rate, cash_flows: &[Money]) -> FairValueResult<Vec<Money>> {
    validate_rate(rate)?;

    let one_plus_r = Decimal::ONE + rate;
    let mut discount = Decimal::ONE;
    let mut out = Vec::with_capacity(cash_flows.len());

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount = discount
                .checked_mul(one_plus_r)
                .ok_or_else(|| FairValueError::InvalidInput {
                    field: "rate".into(),
                    reason: format!("Discount factor overflows at period {t}"),
                })?;
        }
        if discount.is_zero() {
            return Err(FairValueError::DivisionByZero {
                context: format!("NPV discount factor at period {t}"),
            });
        }
        out.push(cf / discount);
    }

    Ok(out)
}

/// Compound a present value forward by `periods` years.
pub fn compound(rate: Rate, periods: u32, present_value: Money) -> FairValueResult<Money> {
    validate_rate(rate)?;

    let one_plus_r = Decimal::ONE + rate;
    let mut value = present_value;
    for _ in 0..periods {
        value = value
            .checked_mul(one_plus_r)
            .ok_or_else(|| FairValueError::InvalidInput {
                field: "present_value".into(),
                reason: format!("Compounding overflows over {periods} periods"),
            })?;
    }
    Ok(value)
}
