//! Loopstake Common Library
//!
//! Shared types, constants, math and errors for the loopstake leveraged
//! staking vault. The engine crate (`loopstake-vault`) builds every
//! component on top of this foundation.
//!
//! ## Contents
//!
//! - **Constants**: leverage caps, loop taper divisors, default parameters
//! - **Errors**: the `VaultError` taxonomy with stable error codes
//! - **Types**: `StrategyParams`, `PositionMetrics`, `LedgerEntry`
//! - **Math**: checked basis-point and 18-decimal fixed-point arithmetic
//! - **Validation**: `check!` macro and `require_*` helpers
//!
//! This crate is `no_std` compatible when built without the default
//! `std` feature.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod validation;

// Re-exports for convenience
pub use constants::*;
pub use errors::*;
pub use types::*;
pub use math::*;
