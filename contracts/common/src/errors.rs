//! Error Types for the loopstake vault
//!
//! Typed errors carrying the numbers that caused them, so a failed
//! operation can be diagnosed from the error alone.

use thiserror::Error;

/// Result type alias for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Main error enum for all vault errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    // ============ Configuration Errors ============
    /// Strategy parameters violate ordering or cap invariants
    #[error("invalid parameter configuration: {reason}")]
    InvalidParameterConfiguration { reason: &'static str },

    /// Only the operator can perform this action
    #[error("operator only")]
    AdminOnly,

    // ============ Strategy Errors ============
    /// New capital inflows are rejected while the strategy is inactive
    #[error("strategy currently disabled")]
    StrategyCurrentlyDisabled,

    /// Leverage would exceed the maximum safe ratio
    #[error("dangerous leverage level: {leverage_bps}bps exceeds {max_safe_bps}bps")]
    DangerousLeverageLevel { leverage_bps: u64, max_safe_bps: u64 },

    /// Position does not hold enough collateral or equity for the request
    #[error("insufficient collateral coverage: available {available}, required {required}")]
    InsufficientCollateralCoverage { available: u64, required: u64 },

    /// Realized amount fell short of the caller's minimum
    #[error("excessive slippage: realized {realized}, minimum {minimum}")]
    ExcessiveSlippageDetected { realized: u64, minimum: u64 },

    /// Loop hit its cycle cap while each cycle still moved meaningful capital
    #[error("maximum loop cycles exceeded: {cycles} cycles, last amount {last_amount}")]
    MaximumLoopCyclesExceeded { cycles: u8, last_amount: u64 },

    /// Staking venue could not value a nonzero staked amount
    #[error("price oracle failure valuing {staked_amount} staked units")]
    PriceOracleFailure { staked_amount: u64 },

    // ============ Amount Errors ============
    /// Zero amount not allowed
    #[error("zero amount")]
    ZeroAmount,

    /// User tried to burn more shares than they hold
    #[error("insufficient shares: available {available}, requested {requested}")]
    InsufficientShares { available: u64, requested: u64 },

    // ============ Venue Errors ============
    /// A state-changing venue call failed
    #[error("{venue} venue call `{operation}` failed")]
    VenueCallFailed {
        venue: VenueKind,
        operation: &'static str,
    },

    /// A venue balance query failed
    #[error("{venue} venue query `{query}` failed")]
    VenueQueryFailed {
        venue: VenueKind,
        query: &'static str,
    },

    // ============ Timing / Concurrency Errors ============
    /// Harvest attempted before the cooldown elapsed
    #[error("harvest cooldown active until {next_allowed}")]
    HarvestCooldownActive { now: u64, next_allowed: u64 },

    /// Another mutating operation holds the vault
    #[error("operation in progress")]
    OperationInProgress,

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    #[error("arithmetic overflow")]
    Overflow,

    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,

    // ============ Input Validation Errors ============
    /// Invalid input parameter
    #[error("invalid input `{param}`: {reason}")]
    InvalidInput {
        param: &'static str,
        reason: &'static str,
    },
}

/// External venue a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueKind {
    /// Liquid staking venue (base asset <-> staked asset)
    Staking,
    /// Lending venue (staked collateral, base-asset debt)
    Lending,
}

impl core::fmt::Display for VenueKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Staking => f.write_str("staking"),
            Self::Lending => f.write_str("lending"),
        }
    }
}

impl VaultError {
    /// Returns a stable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameterConfiguration { .. } => "E001_INVALID_PARAMS",
            Self::AdminOnly => "E002_ADMIN_ONLY",
            Self::StrategyCurrentlyDisabled => "E010_STRATEGY_DISABLED",
            Self::DangerousLeverageLevel { .. } => "E011_DANGEROUS_LEVERAGE",
            Self::InsufficientCollateralCoverage { .. } => "E012_INSUFFICIENT_COVERAGE",
            Self::ExcessiveSlippageDetected { .. } => "E013_EXCESSIVE_SLIPPAGE",
            Self::MaximumLoopCyclesExceeded { .. } => "E014_MAX_LOOP_CYCLES",
            Self::PriceOracleFailure { .. } => "E015_ORACLE_FAILURE",
            Self::ZeroAmount => "E020_ZERO_AMOUNT",
            Self::InsufficientShares { .. } => "E021_INSUFFICIENT_SHARES",
            Self::VenueCallFailed { .. } => "E030_VENUE_CALL_FAILED",
            Self::VenueQueryFailed { .. } => "E031_VENUE_QUERY_FAILED",
            Self::HarvestCooldownActive { .. } => "E040_HARVEST_COOLDOWN",
            Self::OperationInProgress => "E041_OPERATION_IN_PROGRESS",
            Self::Overflow => "E080_OVERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
            Self::InvalidInput { .. } => "E090_INVALID_INPUT",
        }
    }

    /// Returns true if the caller can succeed by retrying later or
    /// adjusting the request
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::ExcessiveSlippageDetected { .. } => true, // Lower the minimum
            Self::HarvestCooldownActive { .. } => true,     // Wait
            Self::OperationInProgress => true,              // Retry
            Self::PriceOracleFailure { .. } => true,        // Wait for the feed
            Self::VenueQueryFailed { .. } => true,
            Self::InsufficientShares { .. } => true,
            _ => false,
        }
    }
}
