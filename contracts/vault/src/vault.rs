//! Leverage Vault
//!
//! Orchestrates the engine: deposits run the leverage loop, withdrawals run a
//! proportional unwind, and maintenance harvests rewards and rebalances.
//!
//! ## Atomicity
//!
//! Every mutating entry point runs inside [`LeverageVault::transact`]. It
//! checkpoints both venues, the vault wallet and the vault's own state, and
//! restores all of them when the operation fails. A failed deposit,
//! withdrawal or rebalance therefore leaves shares, debt and stake exactly
//! as they were.
//!
//! ## Time
//!
//! Callers pass the current time (`now`, seconds) explicitly. The vault never
//! reads a clock.

use borsh::{BorshDeserialize, BorshSerialize};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use loopstake_common::{
    calculate_health_score, check, mul_div, split_protocol_fee,
    validation::{
        require_admin, require_min_output, require_safe_leverage, require_sufficient_shares,
        require_valid_address,
    },
    Address, LedgerEntry, PositionMetrics, StrategyParams, VaultError, VaultResult,
};

use crate::ledger::PositionLedger;
use crate::loop_strategy::build_leveraged_position;
use crate::metrics::{compute_metrics, QueryPolicy};
use crate::position::Position;
use crate::rebalancer::{maybe_rebalance, rebalance_direction, Adjustment, RebalanceDirection};
use crate::unwind::{full_unwind, proportional_unwind, UnwindOutcome};
use crate::venue::{LendingVenue, Revertible, StakingVenue};

// ============ Persistent State ============

/// Everything the vault persists between runs. Venue balances are not part
/// of it: they live at the venues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct VaultState {
    /// May reconfigure and trigger emergency unwinds
    pub operator: Address,
    /// Address the lending venue knows the position by
    pub owner: Address,
    pub params: StrategyParams,
    pub ledger: PositionLedger,
    /// Base asset held by the vault itself
    pub liquid_base: u64,
    pub last_harvest: u64,
    pub last_rebalance: u64,
    pub created_at: u64,
}

impl VaultState {
    /// Serialize state to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize state from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

// ============ Receipts ============

/// Result of a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryReceipt {
    pub shares_minted: u64,
    pub share_balance: u64,
    /// Realized increase in total staked units
    pub staked_received: u64,
    pub cycles: u8,
    /// Leverage after the deposit
    pub leverage_ratio: u64,
}

/// Result of a withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReceipt {
    pub shares_burned: u64,
    pub remaining_shares: u64,
    /// Base asset released to the user
    pub output: u64,
    pub unwind: UnwindOutcome,
}

/// Result of a harvest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestReport {
    pub claimed: u64,
    pub protocol_fee: u64,
    /// Remainder put back through the loop (zero while the strategy is inactive)
    pub reinvested: u64,
    pub cycles: u8,
}

/// Read-only overview for operators and dashboards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultStatus {
    /// SHA-256 of the live parameters
    pub params_fingerprint: [u8; 32],
    pub strategy_active: bool,
    pub total_shares: u64,
    pub net_inflow: u64,
    pub liquid_base: u64,
    pub health_score: u8,
    pub metrics: PositionMetrics,
}

// ============ Leverage Vault ============

/// The leveraged staking vault over a staking venue `S` and lending venue `L`
#[derive(Debug)]
pub struct LeverageVault<S, L> {
    operator: Address,
    params: StrategyParams,
    ledger: PositionLedger,
    position: Position<S, L>,
    last_harvest: u64,
    last_rebalance: u64,
    created_at: u64,
}

/// Vault-side restore point, paired with a venue checkpoint in `transact`
struct Snapshot {
    params: StrategyParams,
    ledger: PositionLedger,
    last_harvest: u64,
    last_rebalance: u64,
}

impl<S, L> LeverageVault<S, L> {
    /// Create a vault with validated parameters.
    ///
    /// The first harvest becomes possible one cooldown after `now`.
    pub fn new(
        operator: Address,
        owner: Address,
        params: StrategyParams,
        staking: S,
        lending: L,
        now: u64,
    ) -> VaultResult<Self> {
        require_valid_address(operator, "operator")?;
        require_valid_address(owner, "owner")?;
        params.validate()?;

        info!(
            "vault created: target {} bp, max safe {} bp, params {}",
            params.target_leverage_ratio,
            params.max_safe_leverage_ratio,
            hex::encode(params.fingerprint())
        );

        Ok(Self {
            operator,
            params,
            ledger: PositionLedger::new(),
            position: Position::new(staking, lending, owner, 0),
            last_harvest: now,
            last_rebalance: now,
            created_at: now,
        })
    }

    /// Rebuild a vault around persisted state and fresh venue handles
    pub fn from_state(state: VaultState, staking: S, lending: L) -> VaultResult<Self> {
        require_valid_address(state.operator, "operator")?;
        state.params.validate()?;

        Ok(Self {
            operator: state.operator,
            params: state.params,
            ledger: state.ledger,
            position: Position::new(staking, lending, state.owner, state.liquid_base),
            last_harvest: state.last_harvest,
            last_rebalance: state.last_rebalance,
            created_at: state.created_at,
        })
    }

    /// Current persistent state
    pub fn state(&self) -> VaultState {
        VaultState {
            operator: self.operator,
            owner: self.position.owner(),
            params: self.params,
            ledger: self.ledger.clone(),
            liquid_base: self.position.liquid_base(),
            last_harvest: self.last_harvest,
            last_rebalance: self.last_rebalance,
            created_at: self.created_at,
        }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn liquid_base(&self) -> u64 {
        self.position.liquid_base()
    }

    pub fn share_balance(&self, user: &Address) -> u64 {
        self.ledger.share_balance(user)
    }

    pub fn ledger_entry(&self, user: &Address) -> Option<LedgerEntry> {
        self.ledger.entry(user)
    }

    /// Earliest time the next harvest may run
    pub fn next_harvest_at(&self) -> u64 {
        self.last_harvest
            .saturating_add(self.params.harvest_cooldown_secs)
    }

    /// Replace the strategy parameters.
    ///
    /// Operator only. The new set is validated as a whole; on any violation
    /// the current parameters stay in place.
    pub fn reconfigure(&mut self, signer: Address, params: StrategyParams) -> VaultResult<()> {
        require_admin(self.operator, signer)?;
        params.validate()?;

        self.params = params;
        info!(
            "strategy reconfigured: target {} bp, max safe {} bp, active {}, params {}",
            params.target_leverage_ratio,
            params.max_safe_leverage_ratio,
            params.strategy_active,
            hex::encode(params.fingerprint())
        );
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            params: self.params,
            ledger: self.ledger.clone(),
            last_harvest: self.last_harvest,
            last_rebalance: self.last_rebalance,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.params = snapshot.params;
        self.ledger = snapshot.ledger;
        self.last_harvest = snapshot.last_harvest;
        self.last_rebalance = snapshot.last_rebalance;
    }
}

// ============ Queries ============

impl<S: StakingVenue, L: LendingVenue> LeverageVault<S, L> {
    /// Position metrics for display. Failed debt and collateral queries
    /// read as zero here; valuation failures still fail.
    pub fn metrics(&self) -> VaultResult<PositionMetrics> {
        compute_metrics(&self.position, QueryPolicy::Advisory)
    }

    /// Remaining safety buffer below `max_safe_leverage_ratio`, 0-100
    pub fn health_score(&self) -> VaultResult<u8> {
        let metrics = self.metrics()?;
        Ok(calculate_health_score(
            metrics.leverage_ratio,
            self.params.max_safe_leverage_ratio,
        ))
    }

    /// Whether leverage has drifted out of the rebalance band
    pub fn rebalance_needed(&self) -> VaultResult<bool> {
        let metrics = self.metrics()?;
        Ok(rebalance_direction(&metrics, &self.params) != RebalanceDirection::Hold)
    }

    /// Base asset `user` could redeem right now: their share of net equity
    /// plus their share of the idle wallet, before unwind costs
    pub fn claim_value(&self, user: &Address) -> VaultResult<u64> {
        let metrics = self.metrics()?;
        let value = metrics
            .net_equity_value
            .checked_add(self.position.liquid_base())
            .ok_or(VaultError::Overflow)?;
        self.ledger.entitlement(user, value)
    }

    pub fn status(&self) -> VaultResult<VaultStatus> {
        let metrics = self.metrics()?;
        Ok(VaultStatus {
            params_fingerprint: self.params.fingerprint(),
            strategy_active: self.params.strategy_active,
            total_shares: self.ledger.total_shares(),
            net_inflow: self.ledger.net_inflow(),
            liquid_base: self.position.liquid_base(),
            health_score: calculate_health_score(
                metrics.leverage_ratio,
                self.params.max_safe_leverage_ratio,
            ),
            metrics,
        })
    }
}

// ============ Operations ============

impl<S, L> LeverageVault<S, L>
where
    S: StakingVenue + Revertible,
    L: LendingVenue + Revertible,
{
    /// New stake must not leave the position above `max_safe_leverage_ratio`
    /// unless it brought leverage down. After a price drop an over-levered
    /// position still accepts deposits, which dilute its leverage.
    fn guard_leverage(&self, before: &PositionMetrics, after: &PositionMetrics) -> VaultResult<()> {
        if after.leverage_ratio < before.leverage_ratio {
            return Ok(());
        }
        require_safe_leverage(after.leverage_ratio, self.params.max_safe_leverage_ratio)
    }

    /// Run `op` all-or-nothing: on error, venues, wallet and vault state are
    /// restored to what they were before the call.
    fn transact<T>(
        &mut self,
        operation: &'static str,
        op: impl FnOnce(&mut Self) -> VaultResult<T>,
    ) -> VaultResult<T> {
        let venues = self.position.checkpoint();
        let snapshot = self.snapshot();

        match op(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.position.revert(venues);
                self.restore(snapshot);
                warn!("{} reverted: {} ({})", operation, err, err.code());
                Err(err)
            }
        }
    }

    /// Deposit `amount` base asset for `user` and lever it up.
    ///
    /// Fails with `ExcessiveSlippageDetected` when the realized increase in
    /// staked units is below `min_staked`.
    pub fn enter(
        &mut self,
        user: Address,
        amount: u64,
        min_staked: u64,
        now: u64,
    ) -> VaultResult<EntryReceipt> {
        check!(self.params.strategy_active, VaultError::StrategyCurrentlyDisabled);
        check!(amount > 0, VaultError::ZeroAmount);
        require_valid_address(user, "user")?;

        self.transact("enter", |vault| {
            // 1. Record the position before anything moves
            let before = compute_metrics(&vault.position, QueryPolicy::Strict)?;

            // 2. Take the deposit into the wallet and run the loop
            vault.position.credit_liquid(amount)?;
            let outcome = build_leveraged_position(&mut vault.position, &vault.params, amount)?;

            // 3. Slippage guard on the observed delta
            let metrics = compute_metrics(&vault.position, QueryPolicy::Strict)?;
            let staked_received = metrics
                .total_staked_balance
                .saturating_sub(before.total_staked_balance);
            require_min_output(staked_received, min_staked)?;

            // 4. Leverage guard
            vault.guard_leverage(&before, &metrics)?;

            // 5. Mint shares 1:1 with the deposit
            let share_balance = vault.ledger.mint(user, amount, now)?;

            info!(
                "deposit of {}: {} cycles, {} staked units, leverage {} bp",
                amount, outcome.cycles, staked_received, metrics.leverage_ratio
            );

            Ok(EntryReceipt {
                shares_minted: amount,
                share_balance,
                staked_received,
                cycles: outcome.cycles,
                leverage_ratio: metrics.leverage_ratio,
            })
        })
    }

    /// Burn `shares` from `user` and pay out their share of the vault.
    ///
    /// The claim is pro rata over both the leveraged position and the idle
    /// wallet balance: `net_equity × shares / total_shares` is unwound, and
    /// `liquid × shares / total_shares` is paid from the wallet. Fails with
    /// `ExcessiveSlippageDetected` when the observed output is below
    /// `min_output`.
    pub fn exit(&mut self, user: Address, shares: u64, min_output: u64) -> VaultResult<ExitReceipt> {
        check!(shares > 0, VaultError::ZeroAmount);
        require_sufficient_shares(self.ledger.share_balance(&user), shares)?;

        self.transact("exit", |vault| {
            // 1. Size the withdrawal against current equity
            let metrics = compute_metrics(&vault.position, QueryPolicy::Strict)?;
            let equity = metrics.net_equity_value;
            let liquid_before = vault.position.liquid_base();
            let has_value = equity > 0 || (metrics.is_empty() && liquid_before > 0);
            check!(
                has_value,
                VaultError::InsufficientCollateralCoverage {
                    available: equity,
                    required: shares,
                }
            );

            // shares <= balance <= total_shares, so both parts stay within
            // equity and the user's entitlement
            let total_shares = vault.ledger.total_shares();
            let withdraw_amount = mul_div(equity, shares, total_shares)?;
            let liquid_share = mul_div(liquid_before, shares, total_shares)?;

            // 2. Unwind and measure what actually arrived
            let unwind = if withdraw_amount > 0 {
                proportional_unwind(&mut vault.position, withdraw_amount, &vault.params)?
            } else {
                UnwindOutcome::default()
            };
            let output = vault
                .position
                .liquid_base()
                .checked_add(liquid_share)
                .ok_or(VaultError::Overflow)?
                .saturating_sub(liquid_before);
            require_min_output(output, min_output)?;

            // 3. Burn shares, then release the output
            let remaining_shares = vault.ledger.burn(user, shares)?;
            vault.position.debit_liquid(output)?;

            info!(
                "withdrawal of {} shares: {} of {} equity plus {} liquid, output {}",
                shares, withdraw_amount, equity, liquid_share, output
            );

            Ok(ExitReceipt {
                shares_burned: shares,
                remaining_shares,
                output,
                unwind,
            })
        })
    }

    /// Claim staking rewards, take the protocol fee and compound the rest.
    pub fn harvest_and_reinvest(&mut self, now: u64) -> VaultResult<HarvestReport> {
        let next_allowed = self.next_harvest_at();
        check!(
            now >= next_allowed,
            VaultError::HarvestCooldownActive { now, next_allowed }
        );

        self.transact("harvest", |vault| {
            // 1. Claim
            let liquid_before = vault.position.liquid_base();
            vault.position.claim_rewards()?;
            let claimed = vault.position.liquid_base().saturating_sub(liquid_before);

            // 2. Protocol fee leaves the wallet
            let (protocol_fee, remainder) =
                split_protocol_fee(claimed, vault.params.protocol_fee_bps)?;
            vault.position.debit_liquid(protocol_fee)?;

            // 3. Compound while the strategy is active
            let mut report = HarvestReport {
                claimed,
                protocol_fee,
                ..HarvestReport::default()
            };
            if vault.params.strategy_active && remainder > 0 {
                let before = compute_metrics(&vault.position, QueryPolicy::Strict)?;
                let outcome =
                    build_leveraged_position(&mut vault.position, &vault.params, remainder)?;
                let metrics = compute_metrics(&vault.position, QueryPolicy::Strict)?;
                vault.guard_leverage(&before, &metrics)?;
                report.reinvested = remainder;
                report.cycles = outcome.cycles;
            }

            vault.last_harvest = now;
            info!(
                "harvest: claimed {}, fee {}, reinvested {}",
                report.claimed, report.protocol_fee, report.reinvested
            );
            Ok(report)
        })
    }

    /// Bring leverage back into band if it has drifted.
    pub fn rebalance(&mut self, now: u64) -> VaultResult<Option<Adjustment>> {
        self.transact("rebalance", |vault| {
            let adjustment = maybe_rebalance(&mut vault.position, &vault.params)?;
            if adjustment.is_some() {
                vault.last_rebalance = now;
            }
            Ok(adjustment)
        })
    }

    /// Tear the whole position down and disable new deposits. Operator only.
    pub fn emergency_unwind(&mut self, signer: Address) -> VaultResult<UnwindOutcome> {
        require_admin(self.operator, signer)?;

        self.transact("emergency unwind", |vault| {
            let outcome = full_unwind(&mut vault.position, &vault.params)?;
            vault.params.strategy_active = false;
            warn!(
                "emergency unwind: repaid {}, {} base now liquid, strategy disabled",
                outcome.debt_repaid,
                vault.position.liquid_base()
            );
            Ok(outcome)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{MarketState, SimLending, SimStaking, SimulatedMarket};
    use loopstake_common::harvest::DEFAULT_HARVEST_COOLDOWN_SECS;

    const OPERATOR: Address = [0x0F; 32];
    const OWNER: Address = [0x11; 32];
    const ALICE: Address = [0xA1; 32];
    const BOB: Address = [0xB0; 32];
    const T0: u64 = 1_700_000_000;

    type SimVault = LeverageVault<SimStaking, SimLending>;

    fn vault_with(state: MarketState, params: StrategyParams) -> (SimulatedMarket, SimVault) {
        let market = SimulatedMarket::new(state);
        let (staking, lending) = market.venues();
        let vault = LeverageVault::new(OPERATOR, OWNER, params, staking, lending, T0).unwrap();
        (market, vault)
    }

    fn default_vault() -> (SimulatedMarket, SimVault) {
        vault_with(MarketState::default(), StrategyParams::default())
    }

    #[test]
    fn test_new_rejects_invalid_params() {
        let market = SimulatedMarket::default();
        let (staking, lending) = market.venues();
        let params = StrategyParams {
            max_safe_leverage_ratio: 9_500,
            ..StrategyParams::default()
        };

        assert!(matches!(
            LeverageVault::new(OPERATOR, OWNER, params, staking, lending, T0),
            Err(VaultError::InvalidParameterConfiguration { .. })
        ));
    }

    #[test]
    fn test_enter_builds_position_and_mints() {
        let (market, mut vault) = default_vault();

        let receipt = vault.enter(ALICE, 1_000, 4_000, T0 + 5).unwrap();
        assert_eq!(receipt.shares_minted, 1_000);
        assert_eq!(receipt.staked_received, 4_464);
        assert_eq!(receipt.cycles, 17);
        assert_eq!(receipt.leverage_ratio, 7_782);

        assert_eq!(vault.share_balance(&ALICE), 1_000);
        assert_eq!(vault.ledger_entry(&ALICE).unwrap().entry_timestamp, T0 + 5);
        assert_eq!(vault.liquid_base(), 10);
        assert_eq!(market.snapshot().debt, 3_474);
    }

    #[test]
    fn test_enter_rejected_while_inactive() {
        let (market, mut vault) = vault_with(
            MarketState::default(),
            StrategyParams {
                strategy_active: false,
                ..StrategyParams::default()
            },
        );

        assert_eq!(
            vault.enter(ALICE, 1_000, 0, T0),
            Err(VaultError::StrategyCurrentlyDisabled)
        );
        assert_eq!(vault.enter(ALICE, 0, 0, T0), Err(VaultError::StrategyCurrentlyDisabled));
        assert!(market.snapshot().call_log.is_empty());
    }

    #[test]
    fn test_enter_zero_rejected() {
        let (_, mut vault) = default_vault();
        assert_eq!(vault.enter(ALICE, 0, 0, T0), Err(VaultError::ZeroAmount));
    }

    #[test]
    fn test_enter_slippage_reverts_everything() {
        let (market, mut vault) = default_vault();

        let err = vault.enter(ALICE, 1_000, 5_000, T0).unwrap_err();
        assert_eq!(
            err,
            VaultError::ExcessiveSlippageDetected {
                realized: 4_464,
                minimum: 5_000,
            }
        );
        assert_eq!(vault.share_balance(&ALICE), 0);
        assert_eq!(vault.liquid_base(), 0);

        let state = market.snapshot();
        assert_eq!((state.debt, state.collateral), (0, 0));
        assert!(state.call_log.is_empty());
    }

    #[test]
    fn test_enter_dilutes_overlevered_position() {
        let (market, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();

        // staked asset drops 15%: leverage 9156 bp, above the 9000 bp ceiling
        market.update(|m| m.exchange_rate_bps = 8_500);
        let before = vault.metrics().unwrap().leverage_ratio;
        assert!(before > vault.params().max_safe_leverage_ratio);

        let receipt = vault.enter(BOB, 1_000, 0, T0 + 1).unwrap();
        assert!(receipt.leverage_ratio < before);
        assert_eq!(vault.ledger().total_shares(), 2_000);
    }

    #[test]
    fn test_leverage_guard() {
        let (_, vault) = default_vault();
        let at = |leverage_ratio| PositionMetrics {
            leverage_ratio,
            ..PositionMetrics::default()
        };

        assert!(vault.guard_leverage(&at(8_000), &at(8_950)).is_ok());
        assert!(vault.guard_leverage(&at(9_500), &at(9_200)).is_ok());
        assert_eq!(
            vault.guard_leverage(&at(8_000), &at(9_100)),
            Err(VaultError::DangerousLeverageLevel {
                leverage_bps: 9_100,
                max_safe_bps: 9_000
            })
        );
        // unchanged leverage above the ceiling is not an improvement
        assert!(vault.guard_leverage(&at(9_200), &at(9_200)).is_err());
    }

    #[test]
    fn test_enter_loop_cap_reverts() {
        let (market, mut vault) = vault_with(
            MarketState::default(),
            StrategyParams {
                max_loop_cycles: 3,
                ..StrategyParams::default()
            },
        );

        assert!(matches!(
            vault.enter(ALICE, 1_000, 0, T0),
            Err(VaultError::MaximumLoopCyclesExceeded { cycles: 3, .. })
        ));
        assert_eq!(market.snapshot().debt, 0);
        assert_eq!(vault.ledger().total_shares(), 0);
    }

    #[test]
    fn test_exit_half_pays_half_equity() {
        let (market, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();

        // 495 of equity plus 5 of the idle wallet
        let receipt = vault.exit(ALICE, 500, 500).unwrap();
        assert_eq!(receipt.output, 500);
        assert_eq!(receipt.remaining_shares, 500);
        assert!(!receipt.unwind.full);

        assert_eq!(vault.liquid_base(), 5);
        assert_eq!(market.snapshot().debt, 1_737);
        assert_eq!(vault.metrics().unwrap().leverage_ratio, 7_782);
    }

    #[test]
    fn test_exit_slippage_leaves_state_unchanged() {
        let (market, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();
        let before = market.snapshot();

        assert_eq!(
            vault.exit(ALICE, 500, 501),
            Err(VaultError::ExcessiveSlippageDetected {
                realized: 500,
                minimum: 501,
            })
        );
        assert_eq!(vault.share_balance(&ALICE), 1_000);
        assert_eq!(vault.liquid_base(), 10);
        assert_eq!(market.snapshot(), before);
    }

    #[test]
    fn test_exit_validation() {
        let (_, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();

        assert_eq!(vault.exit(ALICE, 0, 0), Err(VaultError::ZeroAmount));
        assert_eq!(
            vault.exit(ALICE, 1_001, 0),
            Err(VaultError::InsufficientShares {
                available: 1_000,
                requested: 1_001,
            })
        );
        assert_eq!(
            vault.exit(BOB, 1, 0),
            Err(VaultError::InsufficientShares {
                available: 0,
                requested: 1,
            })
        );
    }

    #[test]
    fn test_exit_with_no_equity_rejected() {
        let (market, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();
        // staked asset loses 30% of its value: debt exceeds collateral value
        market.update(|m| m.exchange_rate_bps = 7_000);

        assert!(matches!(
            vault.exit(ALICE, 1_000, 0),
            Err(VaultError::InsufficientCollateralCoverage { available: 0, .. })
        ));
        assert_eq!(vault.share_balance(&ALICE), 1_000);
    }

    #[test]
    fn test_last_exit_unwinds_fully() {
        let (market, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();

        let receipt = vault.exit(ALICE, 1_000, 1_000).unwrap();
        assert!(receipt.unwind.full);
        assert_eq!(receipt.output, 1_000);
        assert_eq!(vault.share_balance(&ALICE), 0);
        assert_eq!(vault.liquid_base(), 0);

        let state = market.snapshot();
        assert_eq!((state.debt, state.collateral, state.direct_staked), (0, 0, 0));
    }

    #[test]
    fn test_two_users_exit_pro_rata() {
        let (_, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();
        vault.enter(BOB, 1_000, 0, T0 + 1).unwrap();

        let value = vault.metrics().unwrap().net_equity_value + vault.liquid_base();
        assert_eq!(value, 2_000);
        let receipt = vault.exit(BOB, 1_000, 0).unwrap();
        assert_eq!(receipt.output, 1_000);
        assert_eq!(vault.share_balance(&ALICE), 1_000);
        assert_eq!(vault.metrics().unwrap().net_equity_value + vault.liquid_base(), 1_000);
    }

    #[test]
    fn test_harvest_cooldown() {
        let (market, mut vault) = default_vault();
        market.update(|m| m.pending_rewards = 100);

        assert_eq!(
            vault.harvest_and_reinvest(T0 + 10),
            Err(VaultError::HarvestCooldownActive {
                now: T0 + 10,
                next_allowed: T0 + DEFAULT_HARVEST_COOLDOWN_SECS,
            })
        );

        let report = vault
            .harvest_and_reinvest(T0 + DEFAULT_HARVEST_COOLDOWN_SECS)
            .unwrap();
        assert_eq!(report.claimed, 100);
        assert_eq!(vault.next_harvest_at(), T0 + 2 * DEFAULT_HARVEST_COOLDOWN_SECS);
    }

    #[test]
    fn test_harvest_splits_fee_and_reinvests() {
        let (market, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();
        let debt_before = market.snapshot().debt;
        market.update(|m| m.pending_rewards = 200);

        let report = vault
            .harvest_and_reinvest(T0 + DEFAULT_HARVEST_COOLDOWN_SECS)
            .unwrap();
        assert_eq!(report.protocol_fee, 20);
        assert_eq!(report.reinvested, 180);
        assert!(report.cycles > 0);
        assert!(market.snapshot().debt > debt_before);
        // shares are not minted for compounded yield
        assert_eq!(vault.ledger().total_shares(), 1_000);
    }

    #[test]
    fn test_harvest_while_inactive_keeps_remainder_liquid() {
        let (market, mut vault) = default_vault();
        let mut params = *vault.params();
        params.strategy_active = false;
        vault.reconfigure(OPERATOR, params).unwrap();
        market.update(|m| m.pending_rewards = 200);

        let report = vault
            .harvest_and_reinvest(T0 + DEFAULT_HARVEST_COOLDOWN_SECS)
            .unwrap();
        assert_eq!(report.reinvested, 0);
        assert_eq!(vault.liquid_base(), 180);
    }

    #[test]
    fn test_failed_harvest_keeps_cooldown_clock() {
        let (market, mut vault) = default_vault();
        market.update(|m| m.failing_calls.push("claim_rewards"));

        let now = T0 + DEFAULT_HARVEST_COOLDOWN_SECS;
        assert!(vault.harvest_and_reinvest(now).is_err());
        assert_eq!(vault.next_harvest_at(), now);
    }

    #[test]
    fn test_reconfigure_is_operator_only_and_atomic() {
        let (_, mut vault) = default_vault();
        let original = *vault.params();

        let bad = StrategyParams {
            min_efficient_ratio: 8_000,
            ..original
        };
        assert!(vault.reconfigure(OPERATOR, bad).is_err());
        assert_eq!(*vault.params(), original);

        let good = StrategyParams {
            target_leverage_ratio: 7_000,
            ..original
        };
        assert_eq!(vault.reconfigure(ALICE, good), Err(VaultError::AdminOnly));
        assert_eq!(*vault.params(), original);

        vault.reconfigure(OPERATOR, good).unwrap();
        assert_eq!(vault.params().target_leverage_ratio, 7_000);
        assert_ne!(vault.status().unwrap().params_fingerprint, original.fingerprint());
    }

    #[test]
    fn test_rebalance_after_price_move() {
        let (market, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();
        assert!(!vault.rebalance_needed().unwrap());
        assert_eq!(vault.rebalance(T0 + 1).unwrap(), None);

        // staked asset drops 5%: leverage rises to 8193 bp
        market.update(|m| m.exchange_rate_bps = 9_500);
        assert!(vault.rebalance_needed().unwrap());

        let adj = vault.rebalance(T0 + 2).unwrap().unwrap();
        assert_eq!(adj.direction, RebalanceDirection::Reduce);
        assert!(adj.leverage_after < adj.leverage_before);
        assert_eq!(vault.state().last_rebalance, T0 + 2);
    }

    #[test]
    fn test_rebalance_failure_reverts() {
        let (market, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();
        market.update(|m| {
            m.exchange_rate_bps = 9_500;
            m.failing_calls.push("repay");
        });
        let before = market.snapshot();

        assert!(vault.rebalance(T0 + 1).is_err());
        assert_eq!(market.snapshot(), before);
        assert_eq!(vault.liquid_base(), 10);
    }

    #[test]
    fn test_emergency_unwind() {
        let (market, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();

        assert_eq!(vault.emergency_unwind(ALICE), Err(VaultError::AdminOnly));

        let outcome = vault.emergency_unwind(OPERATOR).unwrap();
        assert!(outcome.full);
        assert_eq!(outcome.debt_repaid, 3_474);
        assert!(!vault.params().strategy_active);
        assert_eq!(vault.liquid_base(), 1_000);

        let state = market.snapshot();
        assert_eq!((state.debt, state.collateral), (0, 0));

        assert_eq!(
            vault.enter(ALICE, 10, 0, T0),
            Err(VaultError::StrategyCurrentlyDisabled)
        );

        // shares survive and redeem from the wallet alone
        let receipt = vault.exit(ALICE, 1_000, 1_000).unwrap();
        assert_eq!(receipt.unwind, UnwindOutcome::default());
        assert_eq!(receipt.output, 1_000);
    }

    #[test]
    fn test_emergency_unwind_under_lender_ltv_limit() {
        let (market, mut vault) = vault_with(
            MarketState {
                max_ltv_bps: Some(9_300),
                ..MarketState::default()
            },
            StrategyParams::default(),
        );
        vault.enter(ALICE, 1_000, 0, T0).unwrap();
        vault.enter(BOB, 1_000, 0, T0 + 1).unwrap();

        let outcome = vault.emergency_unwind(OPERATOR).unwrap();
        assert!(outcome.deleverage_steps > 1);
        assert_eq!(vault.liquid_base(), 2_000);
        let state = market.snapshot();
        assert_eq!((state.debt, state.collateral), (0, 0));
    }

    #[test]
    fn test_claim_value() {
        let (_, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();
        vault.enter(BOB, 3_000, 0, T0 + 1).unwrap();

        let total = vault.metrics().unwrap().net_equity_value + vault.liquid_base();
        let shares = vault.ledger().share_balance(&ALICE);
        let expected = mul_div(shares, total, vault.ledger().total_shares()).unwrap();
        assert_eq!(vault.claim_value(&ALICE).unwrap(), expected);
        assert!(vault.claim_value(&ALICE).unwrap() + vault.claim_value(&BOB).unwrap() <= total);
        assert_eq!(vault.claim_value(&[0x77; 32]).unwrap(), 0);
    }

    #[test]
    fn test_queries_use_advisory_metrics() {
        let (market, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();
        market.update(|m| m.debt_query_down = true);

        let metrics = vault.metrics().unwrap();
        assert_eq!(metrics.total_debt_balance, 0);
        assert_eq!(vault.health_score().unwrap(), 100);

        // mutating paths refuse to act on the substituted zero
        assert!(matches!(
            vault.exit(ALICE, 100, 0),
            Err(VaultError::VenueQueryFailed { .. })
        ));
        assert!(vault.rebalance(T0 + 1).is_err());
    }

    #[test]
    fn test_oracle_failure_fails_queries() {
        let (market, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();
        market.update(|m| m.oracle_down = true);

        assert!(matches!(
            vault.health_score(),
            Err(VaultError::PriceOracleFailure { .. })
        ));
        assert!(matches!(
            vault.exit(ALICE, 100, 0),
            Err(VaultError::PriceOracleFailure { .. })
        ));
    }

    #[test]
    fn test_status() {
        let (_, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();

        let status = vault.status().unwrap();
        assert_eq!(status.params_fingerprint, StrategyParams::default().fingerprint());
        assert!(status.strategy_active);
        assert_eq!(status.total_shares, 1_000);
        assert_eq!(status.net_inflow, 1_000);
        assert_eq!(status.liquid_base, 10);
        // (9000 - 7782) * 100 / 9000
        assert_eq!(status.health_score, 13);
        assert_eq!(status.metrics.total_debt_balance, 3_474);
    }

    #[test]
    fn test_state_roundtrip_and_restore() {
        let (market, mut vault) = default_vault();
        vault.enter(ALICE, 1_000, 0, T0).unwrap();

        let bytes = vault.state().to_bytes();
        let state = VaultState::from_bytes(&bytes).unwrap();
        assert_eq!(state, vault.state());

        let (staking, lending) = market.venues();
        let restored = LeverageVault::from_state(state, staking, lending).unwrap();
        assert_eq!(restored.share_balance(&ALICE), 1_000);
        assert_eq!(restored.liquid_base(), 10);
        assert_eq!(restored.metrics().unwrap(), vault.metrics().unwrap());

        assert!(VaultState::from_bytes(&bytes[..bytes.len() - 1]).is_none());
    }
}
