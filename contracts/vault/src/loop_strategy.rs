//! Loop Strategy Engine
//!
//! Builds a leveraged position from a fresh inflow with a bounded
//! stake → pledge → borrow iteration:
//!
//! 1. Stake `current` base asset; observe the staked units actually received.
//! 2. Pledge them and borrow `valuation × target / 10000`; observe the base
//!    asset actually received.
//! 3. Stop voluntarily when the borrow falls below `inflow / 80` or below
//!    `current / 8`.
//! 4. Otherwise the borrow becomes the next cycle's `current`.
//!
//! Hitting `max_loop_cycles` is only an error while the loop was still
//! productive (`current > inflow / 40`).

use log::debug;
use loopstake_common::{
    bps::BPS_DENOMINATOR,
    loop_taper::{CYCLE_TAPER_DIVISOR, INFLOW_TAPER_DIVISOR, PRODUCTIVE_CAP_DIVISOR},
    mul_div, StrategyParams, VaultError, VaultResult,
};

use crate::position::Position;
use crate::venue::{LendingVenue, StakingVenue};

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// Borrow fell below `inflow / 80`
    InflowTaper,
    /// Borrow fell below `current / 8`
    CycleTaper,
    /// Nothing left to stake, or the stake produced no units
    NothingToStake,
    /// `max_loop_cycles` reached after the loop had already tapered
    CycleCap,
}

/// Result of one leverage build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Completed cycles (a cycle stopped by a taper check is not counted)
    pub cycles: u8,
    /// Staked units received over all stakes
    pub total_staked_received: u64,
    /// Base asset received over all borrows
    pub total_borrowed: u64,
    pub stop: LoopStop,
}

/// Run the leverage loop over `inflow` base asset already in the vault wallet.
pub fn build_leveraged_position<S, L>(
    position: &mut Position<S, L>,
    params: &StrategyParams,
    inflow: u64,
) -> VaultResult<LoopOutcome>
where
    S: StakingVenue,
    L: LendingVenue,
{
    let inflow_floor = inflow / INFLOW_TAPER_DIVISOR;
    let productive_floor = inflow / PRODUCTIVE_CAP_DIVISOR;

    let mut current = inflow;
    let mut cycles: u8 = 0;
    let mut total_staked_received: u64 = 0;
    let mut total_borrowed: u64 = 0;
    let mut stop = LoopStop::CycleCap;

    while cycles < params.max_loop_cycles {
        if current == 0 {
            stop = LoopStop::NothingToStake;
            break;
        }

        let staked_received = position.stake_liquid(current)?;
        total_staked_received = total_staked_received
            .checked_add(staked_received)
            .ok_or(VaultError::Overflow)?;
        if staked_received == 0 {
            stop = LoopStop::NothingToStake;
            break;
        }

        let stake_value = position.valuation(staked_received)?;
        let max_borrow = mul_div(stake_value, params.target_leverage_ratio, BPS_DENOMINATOR)?;

        let liquid_before = position.liquid_base();
        position.pledge_and_borrow(staked_received, max_borrow)?;
        let borrowed = position.liquid_base().saturating_sub(liquid_before);
        total_borrowed = total_borrowed
            .checked_add(borrowed)
            .ok_or(VaultError::Overflow)?;

        debug!(
            "loop cycle {}: staked {} -> {} units, borrowed {} of {}",
            cycles + 1,
            current,
            staked_received,
            borrowed,
            max_borrow
        );

        if borrowed < inflow_floor {
            stop = LoopStop::InflowTaper;
            break;
        }
        if borrowed < current / CYCLE_TAPER_DIVISOR {
            stop = LoopStop::CycleTaper;
            break;
        }

        current = borrowed;
        cycles += 1;
    }

    if cycles == params.max_loop_cycles && current > productive_floor {
        return Err(VaultError::MaximumLoopCyclesExceeded {
            cycles,
            last_amount: current,
        });
    }

    Ok(LoopOutcome {
        cycles,
        total_staked_received,
        total_borrowed,
        stop,
    })
}
