//! Rebalancer
//!
//! Keeps leverage inside `target ± rebalance_trigger`. Over-levered positions
//! are reduced by releasing collateral, unstaking it and repaying; under-levered
//! positions are amplified by borrowing and staking the proceeds.

use log::{debug, info};
use loopstake_common::{
    bps::BPS_DENOMINATOR, mul_div, PositionMetrics, StrategyParams, VaultError, VaultResult,
};

use crate::metrics::{compute_metrics, QueryPolicy};
use crate::position::Position;
use crate::venue::{LendingVenue, StakingVenue};

/// What the rebalancer would do for a given position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceDirection {
    /// Leverage within band, or nothing staked
    Hold,
    /// Below band: borrow and stake
    Amplify,
    /// Above band: unstake and repay
    Reduce,
}

/// A completed rebalance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjustment {
    pub direction: RebalanceDirection,
    pub leverage_before: u64,
    pub leverage_after: u64,
    /// Debt added (amplify) or repaid (reduce)
    pub debt_change: u64,
    /// Staked units added (amplify) or released (reduce)
    pub staked_change: u64,
}

/// Decide the rebalance direction. Pure.
pub fn rebalance_direction(metrics: &PositionMetrics, params: &StrategyParams) -> RebalanceDirection {
    if metrics.underlying_value == 0 {
        return RebalanceDirection::Hold;
    }
    if metrics.leverage_ratio > params.band_ceiling() {
        RebalanceDirection::Reduce
    } else if metrics.leverage_ratio < params.band_floor() {
        RebalanceDirection::Amplify
    } else {
        RebalanceDirection::Hold
    }
}

/// Rebalance if leverage has drifted out of band.
///
/// Reads metrics strictly before and after. An amplification that ends above
/// `max_safe_leverage_ratio` fails, as does a reduction that ends above it
/// without having lowered leverage.
pub fn maybe_rebalance<S, L>(
    position: &mut Position<S, L>,
    params: &StrategyParams,
) -> VaultResult<Option<Adjustment>>
where
    S: StakingVenue,
    L: LendingVenue,
{
    let before = compute_metrics(position, QueryPolicy::Strict)?;
    let direction = rebalance_direction(&before, params);

    let (debt_change, staked_change) = match direction {
        RebalanceDirection::Hold => {
            debug!("rebalance: leverage {} bp within band", before.leverage_ratio);
            return Ok(None);
        }
        RebalanceDirection::Amplify => amplify(position, params, &before)?,
        RebalanceDirection::Reduce => reduce(position, params, &before)?,
    };

    let after = compute_metrics(position, QueryPolicy::Strict)?;
    let improved = direction == RebalanceDirection::Reduce
        && after.leverage_ratio < before.leverage_ratio;
    if after.leverage_ratio > params.max_safe_leverage_ratio && !improved {
        return Err(VaultError::DangerousLeverageLevel {
            leverage_bps: after.leverage_ratio,
            max_safe_bps: params.max_safe_leverage_ratio,
        });
    }

    info!(
        "rebalance {:?}: leverage {} -> {} bp (debt change {}, staked change {})",
        direction, before.leverage_ratio, after.leverage_ratio, debt_change, staked_change
    );

    Ok(Some(Adjustment {
        direction,
        leverage_before: before.leverage_ratio,
        leverage_after: after.leverage_ratio,
        debt_change,
        staked_change,
    }))
}

fn target_debt(metrics: &PositionMetrics, params: &StrategyParams) -> VaultResult<u64> {
    mul_div(
        metrics.underlying_value,
        params.target_leverage_ratio,
        BPS_DENOMINATOR,
    )
}

/// Borrow up to target debt, then stake what arrived. Returns (debt added, staked received).
fn amplify<S, L>(
    position: &mut Position<S, L>,
    params: &StrategyParams,
    metrics: &PositionMetrics,
) -> VaultResult<(u64, u64)>
where
    S: StakingVenue,
    L: LendingVenue,
{
    let additional_debt = target_debt(metrics, params)?.saturating_sub(metrics.total_debt_balance);

    let liquid_before = position.liquid_base();
    position.borrow_more(additional_debt)?;
    let borrowed = position.liquid_base().saturating_sub(liquid_before);

    let staked = position.stake_liquid(borrowed)?;
    Ok((additional_debt, staked))
}

/// Release collateral worth `excess × 10000 / target`, unstake it and repay.
/// Returns (debt repaid, staked units released).
fn reduce<S, L>(
    position: &mut Position<S, L>,
    params: &StrategyParams,
    metrics: &PositionMetrics,
) -> VaultResult<(u64, u64)>
where
    S: StakingVenue,
    L: LendingVenue,
{
    let excess_debt = metrics
        .total_debt_balance
        .saturating_sub(target_debt(metrics, params)?);
    let collateral_value = mul_div(excess_debt, BPS_DENOMINATOR, params.target_leverage_ratio)?;
    let to_release = mul_div(
        collateral_value,
        metrics.total_staked_balance,
        metrics.underlying_value,
    )?
    .min(metrics.total_staked_balance);

    let from_direct = to_release.min(metrics.direct_staked_balance);
    let from_collateral = (to_release - from_direct).min(metrics.lending_collateral_balance);
    position.withdraw_collateral(from_collateral)?;

    let released = from_direct + from_collateral;
    let received = position.unstake(released)?;

    let repay = received
        .max(excess_debt.min(position.liquid_base()))
        .min(metrics.total_debt_balance);
    position.repay(repay)?;
    Ok((repay, released))
}
