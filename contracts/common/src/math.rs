//! Mathematical Utilities for the loopstake vault
//!
//! Checked fixed-point arithmetic. Every intermediate product is taken in
//! `u128` and narrowed back to `u64` only after division.

use crate::constants::{bps::BPS_DENOMINATOR, health, precision::RATIO_PRECISION};
use crate::errors::{VaultError, VaultResult};

/// `a * b / denominator` with a `u128` intermediate, rounding down
pub fn mul_div(a: u64, b: u64, denominator: u64) -> VaultResult<u64> {
    if denominator == 0 {
        return Err(VaultError::DivisionByZero);
    }
    let product = (a as u128)
        .checked_mul(b as u128)
        .ok_or(VaultError::Overflow)?;
    narrow(product / denominator as u128)
}

/// `a * b / denominator` rounding up
pub fn mul_div_ceil(a: u64, b: u64, denominator: u64) -> VaultResult<u64> {
    if denominator == 0 {
        return Err(VaultError::DivisionByZero);
    }
    let product = (a as u128)
        .checked_mul(b as u128)
        .ok_or(VaultError::Overflow)?;
    narrow(product.div_ceil(denominator as u128))
}

/// Apply a basis-point fraction: `amount * bps / 10000`
pub fn apply_bps(amount: u64, bps: u64) -> VaultResult<u64> {
    mul_div(amount, bps, BPS_DENOMINATOR)
}

/// Leverage ratio in basis points
///
/// leverage = debt * 10000 / underlying_value, or 0 without underlying value
pub fn calculate_leverage_ratio(debt: u64, underlying_value: u64) -> VaultResult<u64> {
    if underlying_value == 0 {
        return Ok(0);
    }
    mul_div(debt, BPS_DENOMINATOR, underlying_value)
}

/// Net equity, floored at zero
pub fn calculate_net_equity(underlying_value: u64, debt: u64) -> u64 {
    underlying_value.saturating_sub(debt)
}

/// Fraction of net equity a withdrawal represents, as an 18-decimal
/// fixed-point number (`RATIO_PRECISION` = 100%), capped at 100%
pub fn calculate_unwind_ratio(withdraw_amount: u64, net_equity: u64) -> VaultResult<u128> {
    if net_equity == 0 {
        return Err(VaultError::DivisionByZero);
    }
    let ratio = (withdraw_amount as u128)
        .checked_mul(RATIO_PRECISION)
        .ok_or(VaultError::Overflow)?
        / net_equity as u128;
    Ok(ratio.min(RATIO_PRECISION))
}

/// Scale an amount by a fixed-point ratio, rounding down
pub fn scale_by_ratio(amount: u64, ratio: u128) -> VaultResult<u64> {
    let scaled = (amount as u128)
        .checked_mul(ratio)
        .ok_or(VaultError::Overflow)?
        / RATIO_PRECISION;
    narrow(scaled)
}

/// Health score from 100 (no leverage) down to 0 (at or past max safe)
///
/// score = (max_safe - leverage) * 100 / max_safe
pub fn calculate_health_score(leverage_bps: u64, max_safe_bps: u64) -> u8 {
    if max_safe_bps == 0 || leverage_bps >= max_safe_bps {
        return health::MIN_HEALTH_SCORE;
    }
    let buffer = (max_safe_bps - leverage_bps) as u128;
    let score = buffer * health::MAX_HEALTH_SCORE as u128 / max_safe_bps as u128;
    score as u8
}

/// Split harvested yield into (protocol fee, compoundable remainder)
pub fn split_protocol_fee(claimed: u64, fee_bps: u64) -> VaultResult<(u64, u64)> {
    let fee = apply_bps(claimed, fee_bps)?;
    Ok((fee, claimed - fee))
}

fn narrow(value: u128) -> VaultResult<u64> {
    u64::try_from(value).map_err(|_| VaultError::Overflow)
}
