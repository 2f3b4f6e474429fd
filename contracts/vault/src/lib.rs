//! Loopstake Vault
//!
//! Leverage-management engine for a leveraged liquid-staking position.
//! Deposits are staked, pledged and borrowed against in a bounded loop until
//! the target leverage is reached; maintenance keeps leverage inside a band
//! around the target; withdrawals tear down a proportional slice so the
//! remaining position keeps its risk profile.
//!
//! ## Components
//!
//! - **Venues**: `StakingVenue` / `LendingVenue` capability traits
//! - **Position**: venue handles plus the vault wallet
//! - **Metrics**: live position state, strict or advisory
//! - **Loop Strategy**: bounded stake → pledge → borrow iteration
//! - **Rebalancer**: amplify / reduce back toward target
//! - **Unwind**: full and proportional teardown
//! - **Ledger**: per-user shares, 1:1 with deposits
//! - **Vault**: all-or-nothing orchestration of the above
//! - **Shared**: lock-guarded handle for concurrent callers
//!
//! Enable the `simulation` feature for deterministic in-memory venues:
//! ```toml
//! loopstake-vault = { version = "0.1", features = ["simulation"] }
//! ```

pub mod venue;
pub mod position;
pub mod metrics;
pub mod loop_strategy;
pub mod rebalancer;
pub mod unwind;
pub mod ledger;
pub mod vault;
pub mod shared;

#[cfg(any(test, feature = "simulation"))]
pub mod simulation;


pub use ledger::PositionLedger;
pub use loop_strategy::{build_leveraged_position, LoopOutcome, LoopStop};
pub use metrics::{compute_metrics, QueryPolicy};
pub use position::Position;
pub use rebalancer::{maybe_rebalance, rebalance_direction, Adjustment, RebalanceDirection};
pub use shared::SharedVault;
pub use unwind::{full_unwind, proportional_unwind, UnwindOutcome};
pub use vault::{
    EntryReceipt, ExitReceipt, HarvestReport, LeverageVault, VaultState, VaultStatus,
};
pub use venue::{LendingVenue, Revertible, StakingVenue};
