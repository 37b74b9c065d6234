//! Common test utilities for poolbook-core tests.
//!
//! Shared fixtures for every module: ledgers wired to a fixed clock and an
//! in-memory event sink, and bare market records for state-machine tests.

use std::sync::Arc;

use crate::{
    clock::FixedClock,
    config::LedgerConfig,
    events::MemorySink,
    ledger::Ledger,
    market::{Market, MarketId},
};

use self::constants::*;

/// Option labels `"Option 0"`, `"Option 1"`, ...
pub fn options(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("Option {i}")).collect()
}

/// Ledger with default configuration, a clock pinned at [`TEST_NOW`] and a
/// memory sink. The clock and sink handles stay usable by the test.
pub fn test_ledger() -> (Ledger, Arc<FixedClock>, Arc<MemorySink>) {
    test_ledger_with_config(LedgerConfig::default())
}

/// Same as [`test_ledger`] with a custom configuration.
pub fn test_ledger_with_config(config: LedgerConfig) -> (Ledger, Arc<FixedClock>, Arc<MemorySink>) {
    let clock = Arc::new(FixedClock::new(TEST_NOW));
    let events = Arc::new(MemorySink::new());
    let ledger = Ledger::builder()
        .with_config(config)
        .with_clock(clock.clone())
        .with_events(events.clone())
        .build()
        .unwrap();
    (ledger, clock, events)
}

/// Bare open market with `option_count` options, created at [`TEST_NOW`] and
/// closing one hour later.
pub fn create_test_market(option_count: usize) -> Market {
    Market::new(
        MarketId(1),
        TEST_CREATOR.to_string(),
        "Who will win the match?".to_string(),
        options(option_count),
        TEST_NOW,
        TEST_DURATION,
        LedgerConfig::default().max_options,
    )
    .unwrap()
}

/// Common test constants
pub mod constants {
    /// Fixed "now" for tests (Jan 1, 2025)
    pub const TEST_NOW: u64 = 1735689600;

    /// Standard betting window (1 hour)
    pub const TEST_DURATION: u64 = 3600;

    /// Account that opens test markets
    pub const TEST_CREATOR: &str = "market-maker";

    /// Account that resolves test markets
    pub const TEST_RESOLVER: &str = "resolver";

    /// Default minimum stake
    pub const TEST_MIN_BET: u64 = crate::DEFAULT_MIN_BET;
}
