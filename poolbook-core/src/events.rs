//! # Ledger Notifications
//!
//! Every successful mutation publishes one [`LedgerEvent`] to the configured
//! [`EventSink`]. Events are published while the market lock is still held,
//! so for a single market the event order is the commit order. Sinks must
//! therefore return quickly and never call back into the ledger.

use std::sync::Mutex;

use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::market::{AccountId, MarketId};

/// Notification emitted after a committed mutation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LedgerEvent {
    /// Unique event id for downstream deduplication
    pub id: Uuid,

    /// Commit time (Unix timestamp)
    pub at: u64,

    /// What happened
    #[serde(flatten)]
    pub kind: EventKind,
}

/// The four kinds of ledger notification.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    MarketCreated {
        market_id: MarketId,
        question: String,
        creator: AccountId,
        options: Vec<String>,
        deadline: u64,
    },
    BetPlaced {
        market_id: MarketId,
        bettor: AccountId,
        option_index: usize,
        amount: u64,
    },
    MarketResolved {
        market_id: MarketId,
        winning_option: usize,
        resolver: AccountId,
    },
    WinningsClaimed {
        market_id: MarketId,
        claimant: AccountId,
        amount: u64,
    },
}

impl LedgerEvent {
    pub fn new(at: u64, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            at,
            kind,
        }
    }

    /// Market the event refers to
    pub fn market_id(&self) -> MarketId {
        match &self.kind {
            EventKind::MarketCreated { market_id, .. }
            | EventKind::BetPlaced { market_id, .. }
            | EventKind::MarketResolved { market_id, .. }
            | EventKind::WinningsClaimed { market_id, .. } => *market_id,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarketCreated {
                market_id,
                question,
                creator,
                ..
            } => write!(f, "market {market_id} created by {creator}: {question}"),
            Self::BetPlaced {
                market_id,
                bettor,
                option_index,
                amount,
            } => write!(
                f,
                "{bettor} staked {amount} on option {option_index} of market {market_id}"
            ),
            Self::MarketResolved {
                market_id,
                winning_option,
                resolver,
            } => write!(
                f,
                "market {market_id} resolved to option {winning_option} by {resolver}"
            ),
            Self::WinningsClaimed {
                market_id,
                claimant,
                amount,
            } => write!(f, "{claimant} claimed {amount} from market {market_id}"),
        }
    }
}

/// Receiver of ledger notifications.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &LedgerEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: &LedgerEvent) {}
}

/// Writes every event to the `log` facade at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, event: &LedgerEvent) {
        info!(target: "poolbook::events", "[{}] {}", event.id, event.kind);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LedgerEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event published so far
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Remove and return every event published so far
    pub fn drain(&self) -> Vec<LedgerEvent> {
        std::mem::take(
            &mut *self
                .events
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: &LedgerEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event.clone());
    }
}

impl<S: EventSink + ?Sized> EventSink for std::sync::Arc<S> {
    fn publish(&self, event: &LedgerEvent) {
        (**self).publish(event)
    }
}
