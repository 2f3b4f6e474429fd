//! Metrics Engine
//!
//! Computes [`PositionMetrics`] from live venue queries. Nothing is cached:
//! every call reads both venues again.
//!
//! ## Query failure policy
//!
//! A failed valuation is always fatal ([`VaultError::PriceOracleFailure`]).
//! Failed debt, collateral and balance queries depend on the caller:
//!
//! - [`QueryPolicy::Strict`] propagates them. Every mutating operation reads
//!   metrics this way, so economic decisions never rest on a substituted zero.
//! - [`QueryPolicy::Advisory`] reads them as zero and logs a warning. Only
//!   display queries use it.

use log::warn;
use loopstake_common::{
    calculate_leverage_ratio, calculate_net_equity, PositionMetrics, VaultError, VaultResult,
};

use crate::position::Position;
use crate::venue::{LendingVenue, StakingVenue};

/// How a metrics read treats failed debt/collateral/balance queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPolicy {
    /// Propagate every query failure
    Strict,
    /// Substitute zero for failed debt/collateral/balance queries
    Advisory,
}

/// Read the current position state from both venues.
pub fn compute_metrics<S, L>(
    position: &Position<S, L>,
    policy: QueryPolicy,
) -> VaultResult<PositionMetrics>
where
    S: StakingVenue,
    L: LendingVenue,
{
    let direct_staked_balance = read(position.direct_staked_balance(), policy, "staked_balance")?;
    let lending_collateral_balance =
        read(position.collateral_balance(), policy, "collateral_balance")?;
    let total_debt_balance = read(position.debt_balance(), policy, "debt_balance")?;

    let total_staked_balance = direct_staked_balance
        .checked_add(lending_collateral_balance)
        .ok_or(VaultError::Overflow)?;
    let underlying_value = position.valuation(total_staked_balance)?;

    Ok(PositionMetrics {
        direct_staked_balance,
        lending_collateral_balance,
        total_staked_balance,
        underlying_value,
        total_debt_balance,
        leverage_ratio: calculate_leverage_ratio(total_debt_balance, underlying_value)?,
        net_equity_value: calculate_net_equity(underlying_value, total_debt_balance),
    })
}

fn read(result: VaultResult<u64>, policy: QueryPolicy, query: &'static str) -> VaultResult<u64> {
    match (result, policy) {
        (Ok(value), _) => Ok(value),
        (Err(err), QueryPolicy::Strict) => Err(err),
        (Err(err), QueryPolicy::Advisory) => {
            warn!("advisory metrics read: `{}` failed ({}), reading as zero", query, err);
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{MarketState, SimLending, SimStaking, SimulatedMarket};
    use loopstake_common::VenueKind;

    fn position(state: MarketState) -> (SimulatedMarket, Position<SimStaking, SimLending>) {
        let market = SimulatedMarket::new(state);
        let (staking, lending) = market.venues();
        (market, Position::new(staking, lending, [7u8; 32], 0))
    }

    #[test]
    fn test_metrics_of_looped_position() {
        let (_, pos) = position(MarketState {
            exchange_rate_bps: 10_500,
            direct_staked: 200,
            collateral: 1_800,
            debt: 1_500,
            ..MarketState::default()
        });

        let m = compute_metrics(&pos, QueryPolicy::Strict).unwrap();
        assert_eq!(m.total_staked_balance, 2_000);
        assert_eq!(m.underlying_value, 2_100);
        assert_eq!(m.total_debt_balance, 1_500);
        // 1500 * 10000 / 2100 = 7142
        assert_eq!(m.leverage_ratio, 7_142);
        assert_eq!(m.net_equity_value, 600);
    }

    #[test]
    fn test_empty_position() {
        let (_, pos) = position(MarketState {
            oracle_down: true, // never consulted for a zero stake
            ..MarketState::default()
        });

        let m = compute_metrics(&pos, QueryPolicy::Strict).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.leverage_ratio, 0);
        assert_eq!(m.net_equity_value, 0);
    }

    #[test]
    fn test_oracle_failure_is_fatal_in_both_policies() {
        let (_, pos) = position(MarketState {
            collateral: 1_000,
            debt: 700,
            oracle_down: true,
            ..MarketState::default()
        });

        for policy in [QueryPolicy::Strict, QueryPolicy::Advisory] {
            assert_eq!(
                compute_metrics(&pos, policy),
                Err(VaultError::PriceOracleFailure { staked_amount: 1_000 })
            );
        }
    }

    #[test]
    fn test_zero_valuation_is_oracle_failure() {
        let (_, pos) = position(MarketState {
            exchange_rate_bps: 0,
            collateral: 1_000,
            ..MarketState::default()
        });

        assert!(matches!(
            compute_metrics(&pos, QueryPolicy::Advisory),
            Err(VaultError::PriceOracleFailure { .. })
        ));
    }

    #[test]
    fn test_debt_query_failure_by_policy() {
        let (_, pos) = position(MarketState {
            collateral: 1_000,
            debt: 700,
            debt_query_down: true,
            ..MarketState::default()
        });

        assert_eq!(
            compute_metrics(&pos, QueryPolicy::Strict),
            Err(VaultError::VenueQueryFailed {
                venue: VenueKind::Lending,
                query: "debt_balance",
            })
        );

        let advisory = compute_metrics(&pos, QueryPolicy::Advisory).unwrap();
        assert_eq!(advisory.total_debt_balance, 0);
        assert_eq!(advisory.leverage_ratio, 0);
        assert_eq!(advisory.net_equity_value, 1_000);
    }

    #[test]
    fn test_underwater_equity_floors_at_zero() {
        let (_, pos) = position(MarketState {
            collateral: 1_000,
            debt: 1_200,
            ..MarketState::default()
        });

        let m = compute_metrics(&pos, QueryPolicy::Strict).unwrap();
        assert_eq!(m.net_equity_value, 0);
        assert_eq!(m.leverage_ratio, 12_000);
        assert!(m.is_underwater());
    }
}
