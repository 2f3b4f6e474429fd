//! Unwind Engine
//!
//! Full and proportional teardown of the leveraged position.
//!
//! A teardown works on a slice of the position: an amount of debt to repay,
//! plus the directly held stake and the lending collateral to release. Debt
//! goes first, since it is what frees collateral:
//!
//! ```plain
//! 1. repay what the vault wallet can cover
//! 2. while slice debt remains (bounded):
//!      withdraw only the collateral the remaining debt does not need
//!      at max_safe_leverage_ratio, unstake it with any direct stake,
//!      repay
//! 3. withdraw and unstake the rest of the slice
//! ```
//!
//! Every withdrawal leaves the lending position at or below the safe
//! leverage ceiling, so venues enforcing a loan-to-value limit accept it.
//!
//! Proportional unwinds scale all three parts of the slice by the same
//! 18-decimal ratio, so the residual position keeps its leverage.

use log::{debug, info};
use loopstake_common::{
    bps::BPS_DENOMINATOR, calculate_unwind_ratio, check, mul_div_ceil, scale_by_ratio,
    unwind::MAX_DELEVERAGE_STEPS, StrategyParams, VaultError, VaultResult,
};

use crate::metrics::{compute_metrics, QueryPolicy};
use crate::position::Position;
use crate::venue::{LendingVenue, StakingVenue};

/// What a teardown did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnwindOutcome {
    pub debt_repaid: u64,
    /// Staked units moved out of the lending venue
    pub collateral_withdrawn: u64,
    /// Staked units redeemed for base asset
    pub staked_unstaked: u64,
    /// Base asset received from unstaking
    pub base_received: u64,
    /// Withdraw, unstake and repay steps taken while debt was outstanding
    pub deleverage_steps: u8,
    /// Whether the whole position was torn down
    pub full: bool,
}

/// Repay all debt and unstake every staked unit.
///
/// Idempotent: on an empty position no venue call is made.
pub fn full_unwind<S, L>(
    position: &mut Position<S, L>,
    params: &StrategyParams,
) -> VaultResult<UnwindOutcome>
where
    S: StakingVenue,
    L: LendingVenue,
{
    let metrics = compute_metrics(position, QueryPolicy::Strict)?;
    let slice = Slice {
        debt: metrics.total_debt_balance,
        direct: metrics.direct_staked_balance,
        collateral: metrics.lending_collateral_balance,
    };

    let outcome = teardown(position, params, slice, true)?;
    info!(
        "full unwind: repaid {} in {} steps, unstaked {} units for {}",
        outcome.debt_repaid, outcome.deleverage_steps, outcome.staked_unstaked, outcome.base_received
    );
    Ok(outcome)
}

/// Unwind the share of the position that frees `withdraw_amount` of equity.
///
/// Falls back to [`full_unwind`] when `withdraw_amount` covers the whole
/// net equity.
pub fn proportional_unwind<S, L>(
    position: &mut Position<S, L>,
    withdraw_amount: u64,
    params: &StrategyParams,
) -> VaultResult<UnwindOutcome>
where
    S: StakingVenue,
    L: LendingVenue,
{
    check!(withdraw_amount > 0, VaultError::ZeroAmount);

    let metrics = compute_metrics(position, QueryPolicy::Strict)?;
    if withdraw_amount >= metrics.net_equity_value {
        debug!(
            "withdrawal {} covers equity {}, unwinding fully",
            withdraw_amount, metrics.net_equity_value
        );
        return full_unwind(position, params);
    }

    let ratio = calculate_unwind_ratio(withdraw_amount, metrics.net_equity_value)?;
    let slice = Slice {
        debt: scale_by_ratio(metrics.total_debt_balance, ratio)?,
        direct: scale_by_ratio(metrics.direct_staked_balance, ratio)?,
        collateral: scale_by_ratio(metrics.lending_collateral_balance, ratio)?,
    };
    debug!(
        "proportional unwind of {} / {} equity: debt {}, direct {}, collateral {}",
        withdraw_amount, metrics.net_equity_value, slice.debt, slice.direct, slice.collateral
    );

    let outcome = teardown(position, params, slice, false)?;
    info!(
        "proportional unwind: repaid {} in {} steps, unstaked {} units for {}",
        outcome.debt_repaid, outcome.deleverage_steps, outcome.staked_unstaked, outcome.base_received
    );
    Ok(outcome)
}

/// Part of the position being torn down
#[derive(Debug, Clone, Copy)]
struct Slice {
    debt: u64,
    direct: u64,
    collateral: u64,
}

impl Slice {
    fn is_exhausted(&self) -> bool {
        self.direct == 0 && self.collateral == 0
    }
}

fn teardown<S, L>(
    position: &mut Position<S, L>,
    params: &StrategyParams,
    mut slice: Slice,
    full: bool,
) -> VaultResult<UnwindOutcome>
where
    S: StakingVenue,
    L: LendingVenue,
{
    let mut outcome = UnwindOutcome {
        full,
        ..UnwindOutcome::default()
    };
    let debt_to_repay = slice.debt;

    // 1. Wallet first
    repay_from_wallet(position, &mut slice, &mut outcome)?;

    // 2. Deleverage in steps that never push the loan past the ceiling
    while slice.debt > 0 {
        if outcome.deleverage_steps >= MAX_DELEVERAGE_STEPS {
            return Err(VaultError::MaximumLoopCyclesExceeded {
                cycles: outcome.deleverage_steps,
                last_amount: slice.debt,
            });
        }
        if slice.is_exhausted() {
            return Err(VaultError::InsufficientCollateralCoverage {
                available: outcome.debt_repaid.saturating_add(position.liquid_base()),
                required: debt_to_repay,
            });
        }

        let metrics = compute_metrics(position, QueryPolicy::Strict)?;
        let free = free_collateral(
            metrics.lending_collateral_balance,
            metrics.total_debt_balance,
            metrics.total_staked_balance,
            metrics.underlying_value,
            params.max_safe_leverage_ratio,
        )?;
        let from_collateral = free.min(slice.collateral);
        if slice.direct == 0 && from_collateral == 0 {
            return Err(VaultError::DangerousLeverageLevel {
                leverage_bps: metrics.leverage_ratio,
                max_safe_bps: params.max_safe_leverage_ratio,
            });
        }

        let from_direct = slice.direct;
        release(position, &mut slice, from_direct, from_collateral, &mut outcome)?;
        repay_from_wallet(position, &mut slice, &mut outcome)?;
        outcome.deleverage_steps += 1;
    }

    // 3. Debt is settled: the rest of the slice is free
    let rest = slice;
    release(position, &mut slice, rest.direct, rest.collateral, &mut outcome)?;
    Ok(outcome)
}

/// Collateral units that can leave the lending venue while
/// `debt / value(collateral left) <= ceiling_bps`.
///
/// The locked amount rounds up, so the venue sees a ratio at or below the
/// ceiling after the withdrawal.
fn free_collateral(
    collateral: u64,
    debt: u64,
    total_staked: u64,
    underlying_value: u64,
    ceiling_bps: u64,
) -> VaultResult<u64> {
    if debt == 0 {
        return Ok(collateral);
    }
    if underlying_value == 0 {
        return Ok(0);
    }
    let locked_value = mul_div_ceil(debt, BPS_DENOMINATOR, ceiling_bps)?;
    let locked = mul_div_ceil(locked_value, total_staked, underlying_value)?;
    Ok(collateral.saturating_sub(locked))
}

fn repay_from_wallet<S, L>(
    position: &mut Position<S, L>,
    slice: &mut Slice,
    outcome: &mut UnwindOutcome,
) -> VaultResult<()>
where
    S: StakingVenue,
    L: LendingVenue,
{
    let amount = slice.debt.min(position.liquid_base());
    position.repay(amount)?;
    slice.debt -= amount;
    outcome.debt_repaid = outcome.debt_repaid.saturating_add(amount);
    Ok(())
}

/// Withdraw `from_collateral` pledged units, then unstake them together with
/// `from_direct` directly held units.
fn release<S, L>(
    position: &mut Position<S, L>,
    slice: &mut Slice,
    from_direct: u64,
    from_collateral: u64,
    outcome: &mut UnwindOutcome,
) -> VaultResult<()>
where
    S: StakingVenue,
    L: LendingVenue,
{
    let units = from_direct
        .checked_add(from_collateral)
        .ok_or(VaultError::Overflow)?;
    position.withdraw_collateral(from_collateral)?;
    let received = position.unstake(units)?;

    slice.direct -= from_direct;
    slice.collateral -= from_collateral;
    outcome.collateral_withdrawn = outcome.collateral_withdrawn.saturating_add(from_collateral);
    outcome.staked_unstaked = outcome.staked_unstaked.saturating_add(units);
    outcome.base_received = outcome.base_received.saturating_add(received);

    if units > 0 {
        debug!(
            "unwind tranche: {} direct + {} collateral units -> {} base",
            from_direct, from_collateral, received
        );
    }
    Ok(())
}
