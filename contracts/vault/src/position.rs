//! Position Adapter
//!
//! Owns both venue handles together with the vault's liquid base-asset
//! balance (the vault wallet). Every base-asset movement goes through here:
//! deposits and rewards credit the wallet, stakes and repayments debit it,
//! borrows and unstakes credit it.
//!
//! Zero-amount calls are skipped rather than sent to a venue, which makes
//! teardown steps idempotent on an already-empty position.

use loopstake_common::{Address, Asset, VaultError, VaultResult};

use crate::venue::{LendingVenue, Revertible, StakingVenue};

/// Venue handles plus the vault wallet
#[derive(Debug)]
pub struct Position<S, L> {
    staking: S,
    lending: L,
    owner: Address,
    liquid_base: u64,
}

/// Restore point covering both venues and the vault wallet
pub struct PositionCheckpoint<SC, LC> {
    staking: SC,
    lending: LC,
    liquid_base: u64,
}

impl<S, L> Position<S, L> {
    /// Wrap venue handles for the position held by `owner`
    pub fn new(staking: S, lending: L, owner: Address, liquid_base: u64) -> Self {
        Self {
            staking,
            lending,
            owner,
            liquid_base,
        }
    }

    /// Address the lending venue knows the position by
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Base asset sitting in the vault wallet
    pub fn liquid_base(&self) -> u64 {
        self.liquid_base
    }

    /// Add base asset to the vault wallet
    pub fn credit_liquid(&mut self, amount: u64) -> VaultResult<()> {
        self.liquid_base = self
            .liquid_base
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        Ok(())
    }

    /// Take base asset out of the vault wallet
    pub fn debit_liquid(&mut self, amount: u64) -> VaultResult<()> {
        if amount > self.liquid_base {
            return Err(VaultError::InsufficientCollateralCoverage {
                available: self.liquid_base,
                required: amount,
            });
        }
        self.liquid_base -= amount;
        Ok(())
    }
}

impl<S: StakingVenue, L: LendingVenue> Position<S, L> {
    // ============ Staking Venue ============

    /// Stake base asset from the wallet.
    ///
    /// Returns the realized increase in directly held staked units, read
    /// from the venue balance before and after the call.
    pub fn stake_liquid(&mut self, amount: u64) -> VaultResult<u64> {
        if amount == 0 {
            return Ok(0);
        }
        self.debit_liquid(amount)?;
        let before = self.staking.staked_balance()?;
        self.staking.stake(amount)?;
        let after = self.staking.staked_balance()?;
        Ok(after.saturating_sub(before))
    }

    /// Redeem directly held staked units into the wallet
    pub fn unstake(&mut self, staked_amount: u64) -> VaultResult<u64> {
        if staked_amount == 0 {
            return Ok(0);
        }
        let received = self.staking.unstake(staked_amount)?;
        self.credit_liquid(received)?;
        Ok(received)
    }

    /// Claim staking rewards into the wallet
    pub fn claim_rewards(&mut self) -> VaultResult<u64> {
        let received = self.staking.claim_rewards()?;
        self.credit_liquid(received)?;
        Ok(received)
    }

    /// Value staked units in base asset.
    ///
    /// A failed valuation, or a zero valuation of a nonzero amount, is an
    /// oracle failure: reading it as zero would understate leverage.
    pub fn valuation(&self, staked_amount: u64) -> VaultResult<u64> {
        if staked_amount == 0 {
            return Ok(0);
        }
        match self.staking.valuation(staked_amount) {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(VaultError::PriceOracleFailure { staked_amount }),
        }
    }

    /// Staked units held directly
    pub fn direct_staked_balance(&self) -> VaultResult<u64> {
        self.staking.staked_balance()
    }

    // ============ Lending Venue ============

    /// Pledge directly held staked units and borrow base asset into the wallet
    pub fn pledge_and_borrow(&mut self, collateral: u64, borrow: u64) -> VaultResult<u64> {
        let received = self.lending.deposit_collateral_and_borrow(
            Asset::Staked,
            collateral,
            Asset::Base,
            borrow,
        )?;
        self.credit_liquid(received)?;
        Ok(received)
    }

    /// Borrow more base asset against existing collateral
    pub fn borrow_more(&mut self, amount: u64) -> VaultResult<u64> {
        if amount == 0 {
            return Ok(0);
        }
        let received = self.lending.borrow_more(Asset::Base, amount)?;
        self.credit_liquid(received)?;
        Ok(received)
    }

    /// Repay debt out of the wallet
    pub fn repay(&mut self, amount: u64) -> VaultResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.debit_liquid(amount)?;
        self.lending.repay(Asset::Base, amount)
    }

    /// Move pledged staked units back to direct holdings
    pub fn withdraw_collateral(&mut self, amount: u64) -> VaultResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.lending.withdraw_collateral(Asset::Staked, amount)
    }

    /// Outstanding base-asset debt
    pub fn debt_balance(&self) -> VaultResult<u64> {
        self.lending.debt_balance(&self.owner, Asset::Base)
    }

    /// Staked units pledged at the lending venue
    pub fn collateral_balance(&self) -> VaultResult<u64> {
        self.lending.collateral_balance(&self.owner, Asset::Staked)
    }
}

impl<S: Revertible, L: Revertible> Revertible for Position<S, L> {
    type Checkpoint = PositionCheckpoint<S::Checkpoint, L::Checkpoint>;

    fn checkpoint(&self) -> Self::Checkpoint {
        PositionCheckpoint {
            staking: self.staking.checkpoint(),
            lending: self.lending.checkpoint(),
            liquid_base: self.liquid_base,
        }
    }

    fn revert(&mut self, checkpoint: Self::Checkpoint) {
        self.staking.revert(checkpoint.staking);
        self.lending.revert(checkpoint.lending);
        self.liquid_base = checkpoint.liquid_base;
    }
}
