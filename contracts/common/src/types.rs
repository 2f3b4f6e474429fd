//! Core Types for the loopstake vault
//!
//! Configuration, derived position state and ledger records shared by
//! every engine component.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{defaults, harvest};
use crate::errors::VaultResult;

/// Type alias for addresses (32-byte hash)
pub type Address = [u8; 32];

/// Assets the vault moves between venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum Asset {
    /// The asset users deposit and the lending venue lends out
    Base,
    /// The liquid staking receipt, used as lending collateral
    Staked,
}

// ============ Strategy Configuration ============

/// Operator-controlled strategy configuration.
///
/// Ratios are basis points of debt over staked value. The ordering
/// `min_efficient < target < max_safe <= MAX_LEVERAGE_CAP_BPS` is enforced
/// by [`StrategyParams::validate`]; the vault never holds an instance that
/// fails it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StrategyParams {
    /// Leverage the loop and the rebalancer aim for
    pub target_leverage_ratio: u64,
    /// Leverage that must never be exceeded after an operation
    pub max_safe_leverage_ratio: u64,
    /// Leverage below which the position is not worth its borrow cost
    pub min_efficient_ratio: u64,
    /// Deviation band around target before a rebalance fires
    pub rebalance_trigger: u64,
    /// Hard bound on stake/borrow cycles per loop build
    pub max_loop_cycles: u8,
    /// When false, deposits are rejected; exits, harvests and rebalances still run
    pub strategy_active: bool,
    /// Protocol share of harvested yield
    pub protocol_fee_bps: u64,
    /// Minimum seconds between two harvests
    pub harvest_cooldown_secs: u64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            target_leverage_ratio: defaults::TARGET_LEVERAGE_RATIO_BPS,
            max_safe_leverage_ratio: defaults::MAX_SAFE_LEVERAGE_RATIO_BPS,
            min_efficient_ratio: defaults::MIN_EFFICIENT_RATIO_BPS,
            rebalance_trigger: defaults::REBALANCE_TRIGGER_BPS,
            max_loop_cycles: defaults::MAX_LOOP_CYCLES,
            strategy_active: true,
            protocol_fee_bps: defaults::PROTOCOL_FEE_BPS,
            harvest_cooldown_secs: harvest::DEFAULT_HARVEST_COOLDOWN_SECS,
        }
    }
}

impl StrategyParams {
    /// Check ordering and cap invariants
    pub fn validate(&self) -> VaultResult<()> {
        crate::validation::validate_strategy_params(self)
    }

    /// SHA-256 over the borsh encoding.
    ///
    /// Two parameter sets share a fingerprint iff every field matches.
    pub fn fingerprint(&self) -> [u8; 32] {
        let encoded = borsh::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&encoded);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }

    /// Lower edge of the no-rebalance band
    pub fn band_floor(&self) -> u64 {
        self.target_leverage_ratio.saturating_sub(self.rebalance_trigger)
    }

    /// Upper edge of the no-rebalance band
    pub fn band_ceiling(&self) -> u64 {
        self.target_leverage_ratio.saturating_add(self.rebalance_trigger)
    }
}

// ============ Position State ============

/// Snapshot of the leveraged position, recomputed on every read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PositionMetrics {
    /// Staked asset held directly by the vault
    pub direct_staked_balance: u64,
    /// Staked asset pledged as collateral at the lending venue
    pub lending_collateral_balance: u64,
    /// Sum of the two balances above
    pub total_staked_balance: u64,
    /// `total_staked_balance` valued in base asset
    pub underlying_value: u64,
    /// Outstanding base-asset debt
    pub total_debt_balance: u64,
    /// Debt over underlying value in basis points (0 without underlying value)
    pub leverage_ratio: u64,
    /// Underlying value minus debt, floored at zero
    pub net_equity_value: u64,
}

impl PositionMetrics {
    /// Returns true if the position holds nothing and owes nothing
    pub fn is_empty(&self) -> bool {
        self.total_staked_balance == 0 && self.total_debt_balance == 0
    }

    /// Returns true if debt has reached or passed the staked value
    pub fn is_underwater(&self) -> bool {
        self.total_debt_balance > 0 && self.net_equity_value == 0
    }
}

// ============ Ledger Types ============

/// Per-user share record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LedgerEntry {
    /// Shares held, minted 1:1 with deposited base asset
    pub share_balance: u64,
    /// Time of the most recent deposit
    pub entry_timestamp: u64,
}
