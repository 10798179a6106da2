//! Exact decimal helpers shared by the evaluator and the adjuster.
//!
//! Amounts placed into on-chain messages are truncated toward zero to the
//! stable asset's smallest unit. Truncating (instead of rounding) keeps
//! repeated corrections from drifting upward.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Fractional digits kept on amounts sent on-chain.
pub const AMOUNT_DECIMALS: u32 = 6;

/// Smallest representable stable-asset amount.
pub const AMOUNT_UNIT: Decimal = dec!(0.000001);

const HUNDRED: Decimal = dec!(100);

/// Truncate to [`AMOUNT_DECIMALS`] fractional digits, toward zero.
#[inline]
pub fn truncate_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_DECIMALS, RoundingStrategy::ToZero)
}

/// LTV in percent: `loan / limit * 100`.
///
/// Returns `None` when the borrow limit is zero.
#[inline]
pub fn ltv_percent(loan_amount: Decimal, borrow_limit: Decimal) -> Option<Decimal> {
    if borrow_limit.is_zero() {
        return None;
    }
    loan_amount
        .checked_div(borrow_limit)
        .and_then(|ratio| ratio.checked_mul(HUNDRED))
}

/// Loan amount that puts the position at `target_ltv` percent, truncated.
#[inline]
pub fn target_loan_amount(borrow_limit: Decimal, target_ltv: Decimal) -> Decimal {
    truncate_amount(borrow_limit * target_ltv / HUNDRED)
}

/// Yield tokens to redeem for `stable_amount`, truncated.
///
/// Returns `None` for a non-positive exchange rate.
#[inline]
pub fn yield_tokens_for(stable_amount: Decimal, exchange_rate: Decimal) -> Option<Decimal> {
    if exchange_rate <= Decimal::ZERO {
        return None;
    }
    stable_amount.checked_div(exchange_rate).map(truncate_amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_never_rounds_up() {
        assert_eq!(truncate_amount(dec!(1.0000009)), dec!(1.000000));
        assert_eq!(truncate_amount(dec!(123.4567895)), dec!(123.456789));
        assert_eq!(truncate_amount(dec!(-1.0000009)), dec!(-1.000000));
        assert_eq!(truncate_amount(dec!(5)), dec!(5));
    }

    #[test]
    fn test_ltv_percent_exact() {
        assert_eq!(ltv_percent(dec!(600), dec!(1000)), Some(dec!(60)));
        assert_eq!(ltv_percent(dec!(723.4), dec!(1000)), Some(dec!(72.34)));
        assert_eq!(ltv_percent(dec!(0), dec!(1000)), Some(dec!(0)));
        assert_eq!(ltv_percent(dec!(1), dec!(8)), Some(dec!(12.5)));
    }

    #[test]
    fn test_ltv_percent_zero_limit() {
        assert_eq!(ltv_percent(dec!(10), Decimal::ZERO), None);
    }

    #[test]
    fn test_target_loan_amount_truncates() {
        assert_eq!(target_loan_amount(dec!(1000), dec!(75)), dec!(750));
        // 333.3333333 * 75 / 100 = 249.999999975 -> 249.999999
        assert_eq!(target_loan_amount(dec!(333.3333333), dec!(75)), dec!(249.999999));
    }

    #[test]
    fn test_yield_tokens_for() {
        assert_eq!(yield_tokens_for(dec!(150), dec!(1.2)), Some(dec!(125)));
        // 100 / 1.3 = 76.923076923... -> 76.923076
        assert_eq!(yield_tokens_for(dec!(100), dec!(1.3)), Some(dec!(76.923076)));
        assert_eq!(yield_tokens_for(dec!(100), Decimal::ZERO), None);
        assert_eq!(yield_tokens_for(dec!(100), dec!(-1)), None);
    }
}
