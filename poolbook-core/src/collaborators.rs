//! Seams to the systems around the ledger: who may resolve markets and how
//! payouts reach claimants.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::market::{AccountId, MarketId};

/// Decides whether a caller may resolve markets.
pub trait ResolverAuthority: Send + Sync {
    fn is_resolver(&self, caller: &str) -> bool;
}

/// Trusts every caller; authorization already happened upstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyResolver;

impl ResolverAuthority for AnyResolver {
    fn is_resolver(&self, _caller: &str) -> bool {
        true
    }
}

/// A single designated resolver account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleResolver(pub AccountId);

impl ResolverAuthority for SingleResolver {
    fn is_resolver(&self, caller: &str) -> bool {
        self.0 == caller
    }
}

/// Moves a committed payout to the claimant.
///
/// Called only after the claimant's stake has been zeroed and the market
/// lock released, so a transfer that re-enters the ledger sees the claim as
/// already taken.
pub trait ValueTransfer: Send + Sync {
    fn disburse(&self, market_id: MarketId, recipient: &str, amount: u64) -> anyhow::Result<()>;
}

/// A payout handed to a [`ValueTransfer`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Disbursement {
    pub market_id: MarketId,
    pub recipient: AccountId,
    pub amount: u64,
}

/// Records disbursements in memory instead of moving funds.
#[derive(Debug, Default)]
pub struct RecordingTransfer {
    log: Mutex<Vec<Disbursement>>,
}

impl RecordingTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disbursements(&self) -> Vec<Disbursement> {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Total disbursed to `recipient` across all markets
    pub fn total_for(&self, recipient: &str) -> u64 {
        self.disbursements()
            .iter()
            .filter(|d| d.recipient == recipient)
            .map(|d| d.amount)
            .sum()
    }
}

impl ValueTransfer for RecordingTransfer {
    fn disburse(&self, market_id: MarketId, recipient: &str, amount: u64) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Disbursement {
                market_id,
                recipient: recipient.to_string(),
                amount,
            });
        Ok(())
    }
}
