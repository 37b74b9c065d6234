//! Persistence hand-off.
//!
//! The ledger does not own a storage format. It exports a serde-friendly
//! [`LedgerSnapshot`] that an external store may write anywhere, and rebuilds
//! a ledger from one after re-checking every accounting invariant, so a
//! corrupted or hand-edited snapshot is refused instead of loaded.

use std::{collections::BTreeSet, sync::atomic::Ordering};

use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    ledger::{Ledger, LedgerBuilder},
    market::Market,
    MarketError,
};

/// Current snapshot layout version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Complete ledger state at one instant.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LedgerSnapshot {
    /// Layout version
    pub version: u32,

    /// Time the snapshot was taken (Unix timestamp)
    pub taken_at: u64,

    /// Next market id the ledger will allocate
    pub next_id: u64,

    /// Every market, ascending by id
    pub markets: Vec<Market>,
}

impl LedgerSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Ledger {
    /// Export the state of every market.
    ///
    /// Each market is copied under its own lock, so every market in the
    /// snapshot is internally consistent.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let table = self.read_table();
        let markets = table
            .markets
            .values()
            .map(|entry| {
                entry
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .clone()
            })
            .collect();

        LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            taken_at: self.clock.now(),
            next_id: self.next_id.load(Ordering::SeqCst),
            markets,
        }
    }

    /// Rebuild a ledger from a snapshot, wired with `builder`'s collaborators.
    ///
    /// Every market must satisfy the creation rules under the builder's
    /// configuration as well as the accounting invariants. Markets are
    /// inserted in id order whatever their order in the snapshot.
    pub fn restore(mut snapshot: LedgerSnapshot, builder: LedgerBuilder) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(MarketError::InvalidSnapshot(format!(
                "unsupported version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }

        let ledger = builder.build()?;
        let max_options = ledger.config.max_options;
        let mut seen = BTreeSet::new();
        snapshot.markets.sort_by_key(|market| market.id);

        {
            let mut table = ledger.write_table();
            for market in snapshot.markets {
                if market.id.0 == 0 || market.id.0 >= snapshot.next_id {
                    return Err(MarketError::InvalidSnapshot(format!(
                        "market id {} outside allocated range 1..{}",
                        market.id, snapshot.next_id
                    )));
                }
                if !seen.insert(market.id) {
                    return Err(MarketError::InvalidSnapshot(format!(
                        "duplicate market id {}",
                        market.id
                    )));
                }
                market
                    .check_terms(max_options)
                    .and_then(|()| market.check_invariants())
                    .map_err(|e| {
                        MarketError::InvalidSnapshot(format!("market {}: {e}", market.id))
                    })?;
                table.insert(market);
            }
        }

        ledger.next_id.store(snapshot.next_id.max(1), Ordering::SeqCst);
        log::debug!(
            "restored {} markets, next id {}",
            seen.len(),
            snapshot.next_id.max(1)
        );

        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock,
        config::LedgerConfig,
        market::{MarketId, MarketStatus},
        test_utils::{constants::*, options, test_ledger},
    };

    fn populated_ledger() -> Ledger {
        let (ledger, clock, _) = test_ledger();
        let open = ledger
            .create_market(TEST_CREATOR, "Still open?", options(2), 7200)
            .unwrap();
        let settled = ledger
            .create_market("other", "Settled?", options(3), 3600)
            .unwrap();
        ledger.place_bet(open, "alice", 0, 100).unwrap();
        ledger.place_bet(settled, "alice", 1, 10).unwrap();
        ledger.place_bet(settled, "bob", 1, 20).unwrap();
        ledger.place_bet(settled, "carol", 2, 70).unwrap();
        clock.advance(3600);
        ledger.resolve_market(settled, 1, TEST_RESOLVER).unwrap();
        ledger.claim_winnings(settled, "alice").unwrap();
        ledger
    }

    fn restore_at(snapshot: LedgerSnapshot, now: u64) -> Result<Ledger> {
        Ledger::restore(snapshot, Ledger::builder().with_clock(FixedClock::new(now)))
    }

    #[test]
    fn test_snapshot_survives_json() {
        let ledger = populated_ledger();
        let json = ledger.snapshot().to_json().unwrap();
        let restored = restore_at(LedgerSnapshot::from_json(&json).unwrap(), TEST_NOW + 3600).unwrap();

        assert_eq!(restored.market_count(), 2);
        assert_eq!(restored.get_markets_by_creator(TEST_CREATOR), vec![MarketId(1)]);
        let settled = restored.get_market(MarketId(2)).unwrap();
        assert_eq!(settled.status, MarketStatus::Resolved);
        assert_eq!(settled.paid_out, 33);

        // Claimed stakes stay claimed, the others are still payable.
        assert!(matches!(
            restored.claim_winnings(MarketId(2), "alice"),
            Err(MarketError::NoWinningStake(_))
        ));
        assert_eq!(restored.claim_winnings(MarketId(2), "bob").unwrap(), 66);
        restored.place_bet(MarketId(1), "bob", 1, 50).unwrap();

        let next = restored
            .create_market(TEST_CREATOR, "After restore?", options(2), 60)
            .unwrap();
        assert_eq!(next, MarketId(3));
        restored.verify_all().unwrap();
    }

    #[test]
    fn test_restore_rejects_broken_pools() {
        let mut snapshot = populated_ledger().snapshot();
        snapshot.markets[0].total_pool += 1;
        assert!(matches!(
            restore_at(snapshot, TEST_NOW),
            Err(MarketError::InvalidSnapshot(_))
        ));

        let mut snapshot = populated_ledger().snapshot();
        snapshot.markets[1].pool_by_option[2] += 5;
        snapshot.markets[1].total_pool += 5;
        assert!(matches!(
            restore_at(snapshot, TEST_NOW),
            Err(MarketError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_restore_rejects_invalid_market_fields() {
        let mut snapshot = populated_ledger().snapshot();
        snapshot.markets[0].question = String::new();
        assert!(matches!(
            restore_at(snapshot, TEST_NOW),
            Err(MarketError::InvalidSnapshot(_))
        ));

        let mut snapshot = populated_ledger().snapshot();
        snapshot.markets[0].options = vec!["Yes".to_string(), "Yes".to_string()];
        assert!(matches!(
            restore_at(snapshot, TEST_NOW),
            Err(MarketError::InvalidSnapshot(_))
        ));

        let mut snapshot = populated_ledger().snapshot();
        snapshot.markets[0].deadline = 0;
        assert!(matches!(
            restore_at(snapshot, TEST_NOW),
            Err(MarketError::InvalidSnapshot(_))
        ));

        // Three options do not fit a ledger configured for two.
        let snapshot = populated_ledger().snapshot();
        let builder = Ledger::builder()
            .with_clock(FixedClock::new(TEST_NOW))
            .with_config(LedgerConfig {
                max_options: 2,
                ..LedgerConfig::default()
            });
        assert!(matches!(
            Ledger::restore(snapshot, builder),
            Err(MarketError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_restore_orders_creator_index() {
        let (ledger, _, _) = test_ledger();
        for question in ["First?", "Second?", "Third?"] {
            ledger
                .create_market(TEST_CREATOR, question, options(2), 3600)
                .unwrap();
        }
        let mut snapshot = ledger.snapshot();
        snapshot.markets.reverse();

        let restored = restore_at(snapshot, TEST_NOW).unwrap();
        assert_eq!(
            restored.get_markets_by_creator(TEST_CREATOR),
            vec![MarketId(1), MarketId(2), MarketId(3)]
        );
        assert_eq!(restored.snapshot().markets[0].id, MarketId(1));
    }

    #[test]
    fn test_restore_rejects_bad_ids() {
        let mut snapshot = populated_ledger().snapshot();
        snapshot.next_id = 2;
        assert!(matches!(
            restore_at(snapshot, TEST_NOW),
            Err(MarketError::InvalidSnapshot(_))
        ));

        let mut snapshot = populated_ledger().snapshot();
        let duplicate = snapshot.markets[0].clone();
        snapshot.markets.push(duplicate);
        assert!(matches!(
            restore_at(snapshot, TEST_NOW),
            Err(MarketError::InvalidSnapshot(_))
        ));

        let mut snapshot = populated_ledger().snapshot();
        snapshot.version = 99;
        assert!(matches!(
            restore_at(snapshot, TEST_NOW),
            Err(MarketError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_empty_snapshot() {
        let (ledger, _, _) = test_ledger();
        let restored = restore_at(ledger.snapshot(), TEST_NOW).unwrap();
        assert_eq!(restored.market_count(), 0);
        assert_eq!(
            restored
                .create_market(TEST_CREATOR, "First?", options(2), 60)
                .unwrap(),
            MarketId(1)
        );
    }
}
