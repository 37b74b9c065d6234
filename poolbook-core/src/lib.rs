//! # Poolbook Core
//!
//! Core Rust library for parimutuel market settlement.
//!
//! This library provides the accounting engine behind pooled wagering markets
//! where:
//! - Markets offer two or more mutually exclusive options and close at a deadline
//! - Stakes on every option flow into one shared pool
//! - A single authoritative resolution declares the winning option
//! - Winners withdraw a share of the whole pool proportional to their stake
//!
//! ## Features
//!
//! - **Market Ledger**: Create, bet, resolve and claim with per-market serialization
//! - **Pool Accounting**: Floored proportional payouts that never exceed the pool
//! - **Exactly-once Settlement**: A market resolves once; a winning stake pays once
//! - **Notifications**: Every committed mutation is published to an event sink
//! - **Snapshots**: Export and invariant-checked restore for external storage
//!
//! ## Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use poolbook_core::{FixedClock, Ledger};
//!
//! let clock = Arc::new(FixedClock::new(1735689600));
//! let ledger = Ledger::builder().with_clock(clock.clone()).build()?;
//!
//! let market = ledger.create_market(
//!     "market-maker",
//!     "Who will win the match?",
//!     vec!["Team A".to_string(), "Team B".to_string()],
//!     3600,
//! )?;
//! ledger.place_bet(market, "alice", 0, 100)?;
//! ledger.place_bet(market, "bob", 1, 300)?;
//!
//! clock.advance(3600);
//! ledger.resolve_market(market, 1, "resolver")?;
//! assert_eq!(ledger.claim_winnings(market, "bob")?, 400);
//! Ok::<(), poolbook_core::MarketError>(())
//! ```

pub mod accountant;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod market;
pub mod snapshot;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

pub use clock::{Clock, FixedClock, SystemClock};
pub use collaborators::{AnyResolver, RecordingTransfer, ResolverAuthority, SingleResolver, ValueTransfer};
pub use config::LedgerConfig;
pub use error::{MarketError, Result};
pub use events::{EventKind, EventSink, LedgerEvent, LogSink, MemorySink, NullSink};
pub use ledger::{Ledger, LedgerBuilder};
pub use market::{AccountId, Market, MarketId, MarketStatus, MarketView};
pub use snapshot::LedgerSnapshot;
pub use utils::*;

/// Default minimum stake, in the smallest unit of value
pub const DEFAULT_MIN_BET: u64 = 10;

/// Default upper bound on options per market
pub const DEFAULT_MAX_OPTIONS: usize = 32;
