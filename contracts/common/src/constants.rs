//! Protocol Constants
//!
//! All magic numbers and default configuration values for the loopstake
//! leveraged staking vault.
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production values (day-long harvest cooldown)
//! - Default (no feature) - Testnet values (hour-long harvest cooldown)
//!
//! ```toml
//! # For mainnet deployment:
//! loopstake-common = { path = "...", features = ["mainnet"] }
//! ```

/// Basis point arithmetic
pub mod bps {
    /// Basis points denominator (10000 = 100%)
    pub const BPS_DENOMINATOR: u64 = 10_000;
}

/// Leverage caps (all in basis points of debt over staked value)
pub mod leverage {
    /// Absolute ceiling for `max_safe_leverage_ratio`.
    /// 93% debt-to-value leaves the lending venue's liquidation buffer intact.
    pub const MAX_LEVERAGE_CAP_BPS: u64 = 9_300;

    /// Upper bound for the number of stake/borrow cycles an operator may configure
    pub const MAX_LOOP_CYCLES_CAP: u8 = 64;
}

/// Diminishing-return thresholds for the loop engine.
///
/// Each value is a divisor applied to an amount: a cycle that borrows less
/// than `amount / divisor` is no longer worth running.
pub mod loop_taper {
    /// Stop when a cycle borrows less than 1/80 of the original inflow
    pub const INFLOW_TAPER_DIVISOR: u64 = 80;

    /// Stop when a cycle borrows less than 1/8 of what it staked
    pub const CYCLE_TAPER_DIVISOR: u64 = 8;

    /// Hitting the cycle cap while still moving more than 1/40 of the
    /// inflow means the cap cut off a productive loop
    pub const PRODUCTIVE_CAP_DIVISOR: u64 = 40;
}

/// Unwind engine bounds
pub mod unwind {
    /// Withdraw, unstake and repay steps an unwind may take before giving up.
    /// A position at 8950 bp against a 9000 bp ceiling needs about 30.
    pub const MAX_DELEVERAGE_STEPS: u8 = 64;
}

/// Default strategy parameters
pub mod defaults {
    /// Target leverage (78% debt-to-value)
    pub const TARGET_LEVERAGE_RATIO_BPS: u64 = 7_800;

    /// Maximum safe leverage (90%)
    pub const MAX_SAFE_LEVERAGE_RATIO_BPS: u64 = 9_000;

    /// Below this the position is not worth the borrow cost (50%)
    pub const MIN_EFFICIENT_RATIO_BPS: u64 = 5_000;

    /// Deviation band around target before a rebalance fires (2%)
    pub const REBALANCE_TRIGGER_BPS: u64 = 200;

    /// Default loop depth, enough for the 7800 bp target to taper out naturally
    pub const MAX_LOOP_CYCLES: u8 = 20;

    /// Protocol share of harvested yield (10%)
    pub const PROTOCOL_FEE_BPS: u64 = 1_000;
}

/// Harvest configuration
///
/// Values differ between mainnet and testnet to allow easier testing.
pub mod harvest {
    /// Default minimum time between two harvests
    /// - Mainnet: 24 hours
    /// - Testnet: 1 hour
    #[cfg(feature = "mainnet")]
    pub const DEFAULT_HARVEST_COOLDOWN_SECS: u64 = 86_400;
    #[cfg(not(feature = "mainnet"))]
    pub const DEFAULT_HARVEST_COOLDOWN_SECS: u64 = 3_600;

    /// Operators may not configure a cooldown shorter than this
    pub const MIN_HARVEST_COOLDOWN_SECS: u64 = 60;

    /// Operators may not take more than 30% of harvested yield
    pub const MAX_PROTOCOL_FEE_BPS: u64 = 3_000;
}

/// Precision constants
pub mod precision {
    /// Fixed-point scale for unwind ratios (1e18 = 100%)
    pub const RATIO_PRECISION: u128 = 1_000_000_000_000_000_000;
}

/// Health score bounds
pub mod health {
    /// Score of a position with no leverage at all
    pub const MAX_HEALTH_SCORE: u8 = 100;

    /// Score of a position at or beyond the maximum safe leverage
    pub const MIN_HEALTH_SCORE: u8 = 0;
}
