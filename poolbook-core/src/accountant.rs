//! Pool accounting for parimutuel markets.
//!
//! Stateless arithmetic shared by the ledger: proportional payout shares,
//! checked pool growth and pool balance checks. Every function here is pure
//! and may be called from any thread without coordination.
//!
//! Payouts are floored. The remainder of each division stays in the pool and
//! is never paid to anyone, so the sum of all claims on a market is at most
//! its total pool and at most `claimants - 1` units short of it.

use crate::{error::Result, MarketError};

/// Payout owed to a winning stake.
///
/// Winners split the total pool proportionally to their share of the winning
/// side: `floor(user_stake * total_pool / winning_pool)`. The product is taken
/// in `u128` so large pools cannot overflow the intermediate value.
pub fn compute_payout(user_stake: u64, winning_pool: u64, total_pool: u64) -> Result<u64> {
    if winning_pool == 0 {
        return Err(MarketError::DivisionByZero);
    }

    let payout = u128::from(user_stake) * u128::from(total_pool) / u128::from(winning_pool);
    u64::try_from(payout).map_err(|_| MarketError::ArithmeticOverflow)
}

/// Check that `index` addresses one of `option_count` options.
pub const fn validate_option_index(index: usize, option_count: usize) -> bool {
    index < option_count
}

/// Add a stake to a pool, failing instead of wrapping.
pub fn checked_add_stake(pool: u64, amount: u64) -> Result<u64> {
    pool.checked_add(amount)
        .ok_or(MarketError::ArithmeticOverflow)
}

/// Whether `total` equals the sum of the per-option pools.
pub fn pools_balance(total: u64, by_option: &[u64]) -> bool {
    by_option
        .iter()
        .try_fold(0u64, |acc, pool| acc.checked_add(*pool))
        .is_some_and(|sum| sum == total)
}

/// Decimal odds for an option (`total / option_pool`).
///
/// Returns `None` while nobody has staked on the option.
pub fn implied_odds(option_pool: u64, total_pool: u64) -> Option<f64> {
    if option_pool == 0 {
        return None;
    }
    Some(total_pool as f64 / option_pool as f64)
}

/// Upper bound of the unclaimed flooring remainder for `claimants` winners.
pub const fn max_rounding_loss(claimants: u64) -> u64 {
    claimants.saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sole_winner_takes_whole_pool() {
        assert_eq!(compute_payout(300, 300, 400).unwrap(), 400);
    }

    #[test]
    fn test_payouts_are_floored() {
        assert_eq!(compute_payout(10, 60, 100).unwrap(), 16);
        assert_eq!(compute_payout(20, 60, 100).unwrap(), 33);
        assert_eq!(compute_payout(30, 60, 100).unwrap(), 50);
    }

    #[test]
    fn test_empty_winning_pool_is_division_by_zero() {
        assert!(matches!(
            compute_payout(0, 0, 100),
            Err(MarketError::DivisionByZero)
        ));
    }

    #[test]
    fn test_large_pools_do_not_overflow_intermediate() {
        let stake = u64::MAX / 2;
        let payout = compute_payout(stake, stake, u64::MAX).unwrap();
        assert_eq!(payout, u64::MAX);
    }

    #[test]
    fn test_option_index_validation() {
        assert!(validate_option_index(0, 2));
        assert!(validate_option_index(1, 2));
        assert!(!validate_option_index(2, 2));
        assert!(!validate_option_index(0, 0));
    }

    #[test]
    fn test_checked_add_stake() {
        assert_eq!(checked_add_stake(10, 5).unwrap(), 15);
        assert!(matches!(
            checked_add_stake(u64::MAX, 1),
            Err(MarketError::ArithmeticOverflow)
        ));
    }

    #[test]
    fn test_pools_balance() {
        assert!(pools_balance(60, &[10, 20, 30]));
        assert!(!pools_balance(61, &[10, 20, 30]));
        assert!(pools_balance(0, &[0, 0]));
        assert!(!pools_balance(0, &[u64::MAX, 1]));
    }

    #[test]
    fn test_implied_odds() {
        assert_eq!(implied_odds(100, 400), Some(4.0));
        assert_eq!(implied_odds(0, 400), None);
    }

    #[test]
    fn test_rounding_loss_bound() {
        let claims = [10u64, 20, 30]
            .iter()
            .map(|stake| compute_payout(*stake, 60, 100).unwrap())
            .sum::<u64>();
        assert_eq!(claims, 99);
        assert!(100 - claims <= max_rounding_loss(3));
        assert_eq!(max_rounding_loss(0), 0);
    }
}
