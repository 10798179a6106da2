//! Conversion between raw on-chain integers and exact decimals.
//!
//! Contracts report amounts as `U256` scaled by the token's decimals.
//! Everything above this layer works in `rust_decimal::Decimal`, so these
//! helpers are the only place where scaling happens.

use alloy::primitives::U256;
use anyhow::{anyhow, bail, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimals of 18-decimal fixed point values (exchange rates).
pub const WAD_DECIMALS: u32 = 18;

/// Largest scale a `Decimal` can carry.
const MAX_SCALE: u32 = 28;

/// Convert a raw token amount into a decimal with `decimals` fractional digits.
///
/// Example: `to_decimal(U256::from(1_500_000), 6)` is `1.5`.
pub fn to_decimal(raw: U256, decimals: u32) -> Result<Decimal> {
    if decimals > MAX_SCALE {
        bail!("unsupported token decimals: {decimals}");
    }
    let value: u128 = raw
        .try_into()
        .map_err(|_| anyhow!("on-chain value {raw} does not fit 128 bits"))?;
    let value = i128::try_from(value).map_err(|_| anyhow!("on-chain value {raw} is too large"))?;
    let mut decimal = Decimal::try_from_i128_with_scale(value, decimals)
        .map_err(|e| anyhow!("on-chain value {raw} exceeds decimal range: {e}"))?;
    decimal.normalize_assign();
    Ok(decimal)
}

/// Convert an 18-decimal fixed point value (e.g. an exchange rate).
pub fn wad_to_decimal(raw: U256) -> Result<Decimal> {
    to_decimal(raw, WAD_DECIMALS)
}

/// Convert a decimal amount into raw token units.
///
/// Digits beyond `decimals` are truncated, never rounded up, so the
/// resulting message never asks for more than the caller computed.
pub fn to_raw(amount: Decimal, decimals: u32) -> Result<U256> {
    if amount.is_sign_negative() && !amount.is_zero() {
        bail!("cannot encode negative amount {amount}");
    }
    if decimals > MAX_SCALE {
        bail!("unsupported token decimals: {decimals}");
    }
    let truncated = amount.round_dp_with_strategy(decimals, RoundingStrategy::ToZero);
    let scaled = truncated
        .checked_mul(Decimal::from(10u64.pow(decimals.min(19))))
        .and_then(|v| {
            if decimals > 19 {
                v.checked_mul(Decimal::from(10u64.pow(decimals - 19)))
            } else {
                Some(v)
            }
        })
        .ok_or_else(|| anyhow!("amount {amount} overflows at {decimals} decimals"))?;
    let units = scaled
        .trunc()
        .to_u128()
        .ok_or_else(|| anyhow!("amount {amount} cannot be represented in raw units"))?;
    Ok(U256::from(units))
}
