//! Shared Vault
//!
//! Thread-safe handle over a [`LeverageVault`]. Each mutating operation holds
//! the write lock for its full duration, so a second operation can never
//! interleave with the before/after reads of the first.
//!
//! ```plain
//! enter / exit / harvest / rebalance / unwind / reconfigure -> try_write
//! metrics / health / status / balances                     -> try_read
//!
//! lock busy -> Err(OperationInProgress), never queued
//! ```
//!
//! Guards release on every exit path, including errors and panics.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use loopstake_common::{
    Address, LedgerEntry, PositionMetrics, StrategyParams, VaultError, VaultResult,
};

use crate::rebalancer::Adjustment;
use crate::unwind::UnwindOutcome;
use crate::vault::{
    EntryReceipt, ExitReceipt, HarvestReport, LeverageVault, VaultState, VaultStatus,
};
use crate::venue::{LendingVenue, Revertible, StakingVenue};

/// Cloneable, lock-guarded vault handle
pub struct SharedVault<S, L> {
    inner: Arc<RwLock<LeverageVault<S, L>>>,
}

impl<S, L> Clone for SharedVault<S, L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, L> SharedVault<S, L> {
    pub fn new(vault: LeverageVault<S, L>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(vault)),
        }
    }

    fn write(&self) -> VaultResult<RwLockWriteGuard<'_, LeverageVault<S, L>>> {
        self.inner.try_write().ok_or(VaultError::OperationInProgress)
    }

    fn read(&self) -> VaultResult<RwLockReadGuard<'_, LeverageVault<S, L>>> {
        self.inner.try_read().ok_or(VaultError::OperationInProgress)
    }

    /// Run a read-only closure against the vault
    pub fn inspect<T>(&self, f: impl FnOnce(&LeverageVault<S, L>) -> T) -> VaultResult<T> {
        Ok(f(&*self.read()?))
    }

    pub fn share_balance(&self, user: &Address) -> VaultResult<u64> {
        Ok(self.read()?.share_balance(user))
    }

    pub fn ledger_entry(&self, user: &Address) -> VaultResult<Option<LedgerEntry>> {
        Ok(self.read()?.ledger_entry(user))
    }

    pub fn params(&self) -> VaultResult<StrategyParams> {
        Ok(*self.read()?.params())
    }

    pub fn state(&self) -> VaultResult<VaultState> {
        Ok(self.read()?.state())
    }

    pub fn reconfigure(&self, signer: Address, params: StrategyParams) -> VaultResult<()> {
        self.write()?.reconfigure(signer, params)
    }
}

impl<S: StakingVenue, L: LendingVenue> SharedVault<S, L> {
    pub fn metrics(&self) -> VaultResult<PositionMetrics> {
        self.read()?.metrics()
    }

    pub fn health_score(&self) -> VaultResult<u8> {
        self.read()?.health_score()
    }

    pub fn rebalance_needed(&self) -> VaultResult<bool> {
        self.read()?.rebalance_needed()
    }

    pub fn claim_value(&self, user: &Address) -> VaultResult<u64> {
        self.read()?.claim_value(user)
    }

    pub fn status(&self) -> VaultResult<VaultStatus> {
        self.read()?.status()
    }
}

impl<S, L> SharedVault<S, L>
where
    S: StakingVenue + Revertible,
    L: LendingVenue + Revertible,
{
    pub fn enter(
        &self,
        user: Address,
        amount: u64,
        min_staked: u64,
        now: u64,
    ) -> VaultResult<EntryReceipt> {
        self.write()?.enter(user, amount, min_staked, now)
    }

    pub fn exit(&self, user: Address, shares: u64, min_output: u64) -> VaultResult<ExitReceipt> {
        self.write()?.exit(user, shares, min_output)
    }

    pub fn harvest_and_reinvest(&self, now: u64) -> VaultResult<HarvestReport> {
        self.write()?.harvest_and_reinvest(now)
    }

    pub fn rebalance(&self, now: u64) -> VaultResult<Option<Adjustment>> {
        self.write()?.rebalance(now)
    }

    pub fn emergency_unwind(&self, signer: Address) -> VaultResult<UnwindOutcome> {
        self.write()?.emergency_unwind(signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{MarketState, SimLending, SimStaking, SimulatedMarket};
    use std::thread;

    const OPERATOR: Address = [0x0F; 32];
    const OWNER: Address = [0x11; 32];

    fn shared() -> (SimulatedMarket, SharedVault<SimStaking, SimLending>) {
        let market = SimulatedMarket::new(MarketState::default());
        let (staking, lending) = market.venues();
        let vault =
            LeverageVault::new(OPERATOR, OWNER, StrategyParams::default(), staking, lending, 0)
                .unwrap();
        (market, SharedVault::new(vault))
    }

    #[test]
    fn test_mutation_during_read_is_rejected() {
        let (market, vault) = shared();

        let nested = vault
            .inspect(|_| vault.enter([0xA1; 32], 1_000, 0, 1))
            .unwrap();
        assert_eq!(nested, Err(VaultError::OperationInProgress));
        assert!(market.snapshot().call_log.is_empty());

        // the guard is gone once inspect returns
        vault.enter([0xA1; 32], 1_000, 0, 1).unwrap();
        assert_eq!(vault.share_balance(&[0xA1; 32]).unwrap(), 1_000);
    }

    #[test]
    fn test_reads_run_concurrently() {
        let (_, vault) = shared();
        vault.enter([0xA1; 32], 1_000, 0, 1).unwrap();

        let inner = vault
            .inspect(|_| vault.health_score())
            .unwrap()
            .unwrap();
        assert_eq!(inner, 13);
    }

    #[test]
    fn test_lock_released_after_error() {
        let (_, vault) = shared();

        assert!(vault.exit([0xA1; 32], 1, 0).is_err());
        assert!(vault.status().is_ok());
        assert!(vault.enter([0xA1; 32], 1_000, 0, 1).is_ok());
    }

    #[test]
    fn test_concurrent_deposits_are_serialized() {
        let (market, vault) = shared();

        let handles: Vec<_> = (1..=8u8)
            .map(|i| {
                let vault = vault.clone();
                thread::spawn(move || {
                    let user = [i; 32];
                    loop {
                        match vault.enter(user, 1_000, 0, i as u64) {
                            Err(VaultError::OperationInProgress) => thread::yield_now(),
                            other => return other,
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let status = vault.status().unwrap();
        assert_eq!(status.total_shares, 8_000);
        assert_eq!(market.snapshot().debt, 8 * 3_474);
        assert_eq!(status.liquid_base, 80);
    }
}
