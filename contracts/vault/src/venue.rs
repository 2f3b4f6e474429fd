//! Venue Capability Interfaces
//!
//! The engine never talks to a staking or lending protocol directly. It
//! consumes two typed capabilities, so adapters for real venues and the
//! deterministic doubles in [`crate::simulation`] are interchangeable.
//!
//! Amounts are in base-asset units unless the parameter says staked.

use loopstake_common::{Address, Asset, VaultResult};

/// Liquid staking venue: converts base asset into a staked receipt.
pub trait StakingVenue {
    /// Stake `amount` of base asset. Returns the staked units the venue
    /// reports; callers that need the realized amount read
    /// [`StakingVenue::staked_balance`] before and after instead.
    fn stake(&mut self, amount: u64) -> VaultResult<u64>;

    /// Redeem `staked_amount` staked units for base asset
    fn unstake(&mut self, staked_amount: u64) -> VaultResult<u64>;

    /// Base-asset value of `staked_amount` at the venue's exchange rate.
    ///
    /// Fails when the rate is unavailable.
    fn valuation(&self, staked_amount: u64) -> VaultResult<u64>;

    /// Claim accrued staking rewards, paid in base asset
    fn claim_rewards(&mut self) -> VaultResult<u64>;

    /// Staked units held directly by the vault (not pledged anywhere)
    fn staked_balance(&self) -> VaultResult<u64>;
}

/// Lending venue: holds staked collateral and lends base asset against it.
pub trait LendingVenue {
    /// Pledge collateral and borrow in one call; returns base asset received
    fn deposit_collateral_and_borrow(
        &mut self,
        collateral_asset: Asset,
        collateral_amount: u64,
        borrow_asset: Asset,
        borrow_amount: u64,
    ) -> VaultResult<u64>;

    /// Repay `amount` of debt in `asset`
    fn repay(&mut self, asset: Asset, amount: u64) -> VaultResult<()>;

    /// Borrow against existing collateral; returns base asset received
    fn borrow_more(&mut self, asset: Asset, amount: u64) -> VaultResult<u64>;

    /// Release pledged collateral back to the vault
    fn withdraw_collateral(&mut self, asset: Asset, amount: u64) -> VaultResult<()>;

    /// Outstanding debt of `owner` in `asset`
    fn debt_balance(&self, owner: &Address, asset: Asset) -> VaultResult<u64>;

    /// Collateral of `owner` in `asset`
    fn collateral_balance(&self, owner: &Address, asset: Asset) -> VaultResult<u64>;
}

/// All-or-nothing support for a venue.
///
/// On-chain this is the transaction revert; off-chain adapters implement it
/// with compensating actions. The vault checkpoints every venue before a
/// mutating operation and reverts all of them if the operation fails.
pub trait Revertible {
    /// Opaque restore point
    type Checkpoint;

    /// Capture the venue's current state
    fn checkpoint(&self) -> Self::Checkpoint;

    /// Restore the state captured by `checkpoint`
    fn revert(&mut self, checkpoint: Self::Checkpoint);
}
