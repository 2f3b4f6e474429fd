//! Position Ledger
//!
//! Per-user share balances, minted 1:1 with deposited base asset. Entries are
//! created on first deposit and never removed; a fully exited user keeps an
//! entry with a zero balance.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use loopstake_common::{
    check, mul_div,
    validation::{require_sufficient_shares, require_valid_address},
    Address, LedgerEntry, VaultError, VaultResult,
};

/// Share ledger for all vault users
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct PositionLedger {
    entries: BTreeMap<Address, LedgerEntry>,
    total_shares: u64,
    /// All-time deposits
    total_deposited: u64,
    /// All-time shares burned
    total_redeemed: u64,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint `amount` shares to `user` for a deposit of `amount` base asset.
    ///
    /// Returns the user's new balance.
    pub fn mint(&mut self, user: Address, amount: u64, now: u64) -> VaultResult<u64> {
        require_valid_address(user, "user")?;
        check!(amount > 0, VaultError::ZeroAmount);

        let total_shares = self
            .total_shares
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        let total_deposited = self
            .total_deposited
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;

        let entry = self.entries.entry(user).or_default();
        entry.share_balance = entry
            .share_balance
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        entry.entry_timestamp = now;

        self.total_shares = total_shares;
        self.total_deposited = total_deposited;
        Ok(entry.share_balance)
    }

    /// Burn `shares` from `user`. Returns the remaining balance.
    pub fn burn(&mut self, user: Address, shares: u64) -> VaultResult<u64> {
        check!(shares > 0, VaultError::ZeroAmount);
        let entry = self
            .entries
            .get_mut(&user)
            .ok_or(VaultError::InsufficientShares {
                available: 0,
                requested: shares,
            })?;
        require_sufficient_shares(entry.share_balance, shares)?;

        entry.share_balance -= shares;
        self.total_shares -= shares;
        self.total_redeemed = self.total_redeemed.saturating_add(shares);
        Ok(entry.share_balance)
    }

    pub fn share_balance(&self, user: &Address) -> u64 {
        self.entries.get(user).map_or(0, |e| e.share_balance)
    }

    pub fn entry(&self, user: &Address) -> Option<LedgerEntry> {
        self.entries.get(user).copied()
    }

    pub fn total_shares(&self) -> u64 {
        self.total_shares
    }

    /// All-time deposits minus all-time redemptions
    pub fn net_inflow(&self) -> u64 {
        self.total_deposited.saturating_sub(self.total_redeemed)
    }

    /// Users with an entry, including those at zero
    pub fn holders(&self) -> usize {
        self.entries.len()
    }

    /// Share of `net_equity` attributable to `user`
    ///
    /// entitlement = net_equity * user_shares / total_shares
    pub fn entitlement(&self, user: &Address, net_equity: u64) -> VaultResult<u64> {
        if self.total_shares == 0 {
            return Ok(0);
        }
        mul_div(net_equity, self.share_balance(user), self.total_shares)
    }
}
