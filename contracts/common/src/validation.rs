//! Validation Helpers for the loopstake vault
//!
//! Centralized validation utilities shared by the engine components.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use loopstake_common::{check, validation::require_min_output};
//!
//! check!(amount > 0, VaultError::ZeroAmount);
//! require_min_output(staked_received, min_staked)?;
//! ```

use crate::{
    constants::{bps::BPS_DENOMINATOR, harvest, leverage},
    errors::{VaultError, VaultResult},
    types::{Address, StrategyParams},
};

// ============ Validation Macro ============

/// Check a condition and return an error if it fails.
///
/// ```rust,ignore
/// check!(
///     realized >= minimum,
///     VaultError::ExcessiveSlippageDetected { realized, minimum }
/// );
/// ```
#[macro_export]
macro_rules! check {
    ($condition:expr, $error:expr) => {
        if !($condition) {
            return Err($error);
        }
    };
}

pub use check;

// ============ Common Validation Helpers ============

/// Require the signer to be the operator.
pub fn require_admin(operator: Address, signer: Address) -> VaultResult<()> {
    if operator != signer {
        return Err(VaultError::AdminOnly);
    }
    Ok(())
}

/// Require address to not be zero.
pub fn require_valid_address(address: Address, param: &'static str) -> VaultResult<()> {
    if address == [0u8; 32] {
        return Err(VaultError::InvalidInput {
            param,
            reason: "zero address",
        });
    }
    Ok(())
}

/// Require a user to hold at least `requested` shares.
pub fn require_sufficient_shares(available: u64, requested: u64) -> VaultResult<()> {
    if available < requested {
        return Err(VaultError::InsufficientShares {
            available,
            requested,
        });
    }
    Ok(())
}

/// Require a realized amount to meet the caller's minimum.
///
/// Always called with observed deltas, never with predicted ones.
pub fn require_min_output(realized: u64, minimum: u64) -> VaultResult<()> {
    if realized < minimum {
        return Err(VaultError::ExcessiveSlippageDetected { realized, minimum });
    }
    Ok(())
}

/// Require leverage to stay at or below the maximum safe ratio.
pub fn require_safe_leverage(leverage_bps: u64, max_safe_bps: u64) -> VaultResult<()> {
    if leverage_bps > max_safe_bps {
        return Err(VaultError::DangerousLeverageLevel {
            leverage_bps,
            max_safe_bps,
        });
    }
    Ok(())
}

// ============ Strategy Parameters ============

/// Validate a full parameter set.
///
/// Enforces `min_efficient < target < max_safe <= MAX_LEVERAGE_CAP_BPS`,
/// a positive and bounded loop depth, a trigger inside (0, 100%), and the
/// harvest fee/cooldown bounds.
pub fn validate_strategy_params(params: &StrategyParams) -> VaultResult<()> {
    let invalid = |reason| Err(VaultError::InvalidParameterConfiguration { reason });

    if params.min_efficient_ratio >= params.target_leverage_ratio {
        return invalid("min efficient ratio must be below target");
    }
    if params.target_leverage_ratio >= params.max_safe_leverage_ratio {
        return invalid("target must be below max safe ratio");
    }
    if params.max_safe_leverage_ratio > leverage::MAX_LEVERAGE_CAP_BPS {
        return invalid("max safe ratio exceeds leverage cap");
    }
    if params.max_loop_cycles == 0 {
        return invalid("max loop cycles must be positive");
    }
    if params.max_loop_cycles > leverage::MAX_LOOP_CYCLES_CAP {
        return invalid("max loop cycles exceeds cap");
    }
    if params.rebalance_trigger == 0 || params.rebalance_trigger >= BPS_DENOMINATOR {
        return invalid("rebalance trigger out of range");
    }
    if params.protocol_fee_bps > harvest::MAX_PROTOCOL_FEE_BPS {
        return invalid("protocol fee exceeds cap");
    }
    if params.harvest_cooldown_secs < harvest::MIN_HARVEST_COOLDOWN_SECS {
        return invalid("harvest cooldown below minimum");
    }
    Ok(())
}
