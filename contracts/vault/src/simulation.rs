//! Simulated Venues
//!
//! Deterministic in-memory staking and lending venues sharing one market
//! state, for tests and dry runs. Rates, slippage, haircuts and failures
//! are all set explicitly, so every scenario replays bit-for-bit.
//!
//! Both handles point at the same [`MarketState`]: pledging collateral
//! moves staked units from the staking side to the lending side exactly as
//! a token transfer would.

use std::sync::Arc;

use loopstake_common::{
    bps::BPS_DENOMINATOR, mul_div, Address, Asset, VaultError, VaultResult, VenueKind,
};
use parking_lot::Mutex;

use crate::venue::{LendingVenue, Revertible, StakingVenue};

/// Complete state of the simulated market
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketState {
    /// Base-asset value of one staked unit, in basis points (10000 = 1:1)
    pub exchange_rate_bps: u64,
    /// Share of staked output lost when staking
    pub stake_slippage_bps: u64,
    /// Share of base output lost when unstaking
    pub unstake_haircut_bps: u64,
    /// Share of each borrow kept by the lending venue as an origination fee
    pub borrow_fee_bps: u64,
    /// Rewards waiting to be claimed
    pub pending_rewards: u64,
    /// Staked units held directly by the vault
    pub direct_staked: u64,
    /// Staked units pledged at the lending venue
    pub collateral: u64,
    /// Outstanding base-asset debt
    pub debt: u64,
    /// Highest debt-to-collateral-value ratio the lending venue tolerates
    /// after a collateral withdrawal, in basis points. `None` disables the check.
    pub max_ltv_bps: Option<u64>,
    /// Valuation calls fail while set
    pub oracle_down: bool,
    /// `debt_balance` queries fail while set
    pub debt_query_down: bool,
    /// `collateral_balance` queries fail while set
    pub collateral_query_down: bool,
    /// Operation names whose calls fail
    pub failing_calls: Vec<&'static str>,
    /// Every state-changing call made, in order
    pub call_log: Vec<&'static str>,
}

impl Default for MarketState {
    fn default() -> Self {
        Self {
            exchange_rate_bps: BPS_DENOMINATOR,
            stake_slippage_bps: 0,
            unstake_haircut_bps: 0,
            borrow_fee_bps: 0,
            pending_rewards: 0,
            direct_staked: 0,
            collateral: 0,
            debt: 0,
            max_ltv_bps: None,
            oracle_down: false,
            debt_query_down: false,
            collateral_query_down: false,
            failing_calls: Vec::new(),
            call_log: Vec::new(),
        }
    }
}

impl MarketState {
    fn enter(&mut self, venue: VenueKind, operation: &'static str) -> VaultResult<()> {
        if self.failing_calls.contains(&operation) {
            return Err(VaultError::VenueCallFailed { venue, operation });
        }
        self.call_log.push(operation);
        Ok(())
    }

    fn value_of(&self, staked_amount: u64) -> VaultResult<u64> {
        mul_div(staked_amount, self.exchange_rate_bps, BPS_DENOMINATOR)
    }
}

/// Shared market handle
#[derive(Debug, Clone, Default)]
pub struct SimulatedMarket {
    state: Arc<Mutex<MarketState>>,
}

impl SimulatedMarket {
    /// Create a market from an initial state
    pub fn new(state: MarketState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Staking and lending handles over this market
    pub fn venues(&self) -> (SimStaking, SimLending) {
        (
            SimStaking { market: self.clone() },
            SimLending { market: self.clone() },
        )
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> MarketState {
        self.state.lock().clone()
    }

    /// Mutate the market (price moves, interest accrual, failure injection)
    pub fn update(&self, f: impl FnOnce(&mut MarketState)) {
        f(&mut *self.state.lock());
    }
}

/// Staking side of a [`SimulatedMarket`]
#[derive(Debug, Clone)]
pub struct SimStaking {
    market: SimulatedMarket,
}

/// Lending side of a [`SimulatedMarket`]
#[derive(Debug, Clone)]
pub struct SimLending {
    market: SimulatedMarket,
}

impl StakingVenue for SimStaking {
    fn stake(&mut self, amount: u64) -> VaultResult<u64> {
        let mut state = self.market.state.lock();
        state.enter(VenueKind::Staking, "stake")?;
        let gross = mul_div(amount, BPS_DENOMINATOR, state.exchange_rate_bps)?;
        let slippage = mul_div(gross, state.stake_slippage_bps, BPS_DENOMINATOR)?;
        let received = gross - slippage;
        state.direct_staked = state
            .direct_staked
            .checked_add(received)
            .ok_or(VaultError::Overflow)?;
        Ok(received)
    }

    fn unstake(&mut self, staked_amount: u64) -> VaultResult<u64> {
        let mut state = self.market.state.lock();
        state.enter(VenueKind::Staking, "unstake")?;
        if staked_amount > state.direct_staked {
            return Err(VaultError::VenueCallFailed {
                venue: VenueKind::Staking,
                operation: "unstake",
            });
        }
        let gross = state.value_of(staked_amount)?;
        let haircut = mul_div(gross, state.unstake_haircut_bps, BPS_DENOMINATOR)?;
        state.direct_staked -= staked_amount;
        Ok(gross - haircut)
    }

    fn valuation(&self, staked_amount: u64) -> VaultResult<u64> {
        let state = self.market.state.lock();
        if state.oracle_down {
            return Err(VaultError::VenueQueryFailed {
                venue: VenueKind::Staking,
                query: "valuation",
            });
        }
        state.value_of(staked_amount)
    }

    fn claim_rewards(&mut self) -> VaultResult<u64> {
        let mut state = self.market.state.lock();
        state.enter(VenueKind::Staking, "claim_rewards")?;
        Ok(std::mem::take(&mut state.pending_rewards))
    }

    fn staked_balance(&self) -> VaultResult<u64> {
        Ok(self.market.state.lock().direct_staked)
    }
}

impl LendingVenue for SimLending {
    fn deposit_collateral_and_borrow(
        &mut self,
        collateral_asset: Asset,
        collateral_amount: u64,
        borrow_asset: Asset,
        borrow_amount: u64,
    ) -> VaultResult<u64> {
        let mut state = self.market.state.lock();
        state.enter(VenueKind::Lending, "deposit_collateral_and_borrow")?;
        if collateral_asset != Asset::Staked
            || borrow_asset != Asset::Base
            || collateral_amount > state.direct_staked
        {
            return Err(VaultError::VenueCallFailed {
                venue: VenueKind::Lending,
                operation: "deposit_collateral_and_borrow",
            });
        }
        let collateral = state
            .collateral
            .checked_add(collateral_amount)
            .ok_or(VaultError::Overflow)?;
        let debt = state
            .debt
            .checked_add(borrow_amount)
            .ok_or(VaultError::Overflow)?;
        state.direct_staked -= collateral_amount;
        state.collateral = collateral;
        state.debt = debt;
        let fee = mul_div(borrow_amount, state.borrow_fee_bps, BPS_DENOMINATOR)?;
        Ok(borrow_amount - fee)
    }

    fn repay(&mut self, asset: Asset, amount: u64) -> VaultResult<()> {
        let mut state = self.market.state.lock();
        state.enter(VenueKind::Lending, "repay")?;
        if asset != Asset::Base || amount > state.debt {
            return Err(VaultError::VenueCallFailed {
                venue: VenueKind::Lending,
                operation: "repay",
            });
        }
        state.debt -= amount;
        Ok(())
    }

    fn borrow_more(&mut self, asset: Asset, amount: u64) -> VaultResult<u64> {
        let mut state = self.market.state.lock();
        state.enter(VenueKind::Lending, "borrow_more")?;
        if asset != Asset::Base {
            return Err(VaultError::VenueCallFailed {
                venue: VenueKind::Lending,
                operation: "borrow_more",
            });
        }
        state.debt = state.debt.checked_add(amount).ok_or(VaultError::Overflow)?;
        let fee = mul_div(amount, state.borrow_fee_bps, BPS_DENOMINATOR)?;
        Ok(amount - fee)
    }

    fn withdraw_collateral(&mut self, asset: Asset, amount: u64) -> VaultResult<()> {
        let mut state = self.market.state.lock();
        state.enter(VenueKind::Lending, "withdraw_collateral")?;
        let refused = VaultError::VenueCallFailed {
            venue: VenueKind::Lending,
            operation: "withdraw_collateral",
        };
        if asset != Asset::Staked || amount > state.collateral {
            return Err(refused);
        }
        let remaining = state.collateral - amount;
        if let Some(max_ltv_bps) = state.max_ltv_bps {
            let backing = mul_div(state.value_of(remaining)?, max_ltv_bps, BPS_DENOMINATOR)?;
            if state.debt > backing {
                return Err(refused);
            }
        }
        state.direct_staked = state
            .direct_staked
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        state.collateral = remaining;
        Ok(())
    }

    fn debt_balance(&self, _owner: &Address, _asset: Asset) -> VaultResult<u64> {
        let state = self.market.state.lock();
        if state.debt_query_down {
            return Err(VaultError::VenueQueryFailed {
                venue: VenueKind::Lending,
                query: "debt_balance",
            });
        }
        Ok(state.debt)
    }

    fn collateral_balance(&self, _owner: &Address, _asset: Asset) -> VaultResult<u64> {
        let state = self.market.state.lock();
        if state.collateral_query_down {
            return Err(VaultError::VenueQueryFailed {
                venue: VenueKind::Lending,
                query: "collateral_balance",
            });
        }
        Ok(state.collateral)
    }
}

impl Revertible for SimStaking {
    type Checkpoint = MarketState;

    fn checkpoint(&self) -> MarketState {
        self.market.snapshot()
    }

    fn revert(&mut self, checkpoint: MarketState) {
        *self.market.state.lock() = checkpoint;
    }
}

impl Revertible for SimLending {
    type Checkpoint = MarketState;

    fn checkpoint(&self) -> MarketState {
        self.market.snapshot()
    }

    fn revert(&mut self, checkpoint: MarketState) {
        *self.market.state.lock() = checkpoint;
    }
}
