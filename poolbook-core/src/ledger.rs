//! # Market Ledger
//!
//! The ledger owns every market and its stake table and is the only place
//! they are mutated. Each market sits behind its own mutex: operations on the
//! same market are serialized, operations on different markets only share a
//! brief read lock on the market table.
//!
//! Every mutation validates completely before it writes, so a failed call
//! leaves the market exactly as it was. For the same reason a poisoned market
//! lock still guards consistent state and is recovered rather than
//! propagated as a panic.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use log::{debug, warn};

use crate::{
    clock::{Clock, SystemClock},
    collaborators::{AnyResolver, ResolverAuthority, ValueTransfer},
    config::LedgerConfig,
    error::Result,
    events::{EventKind, EventSink, LedgerEvent, NullSink},
    market::{AccountId, Market, MarketId, MarketView},
    MarketError,
};

/// Market table plus the creator index, guarded together.
#[derive(Default)]
pub(crate) struct MarketTable {
    pub(crate) markets: BTreeMap<MarketId, Arc<Mutex<Market>>>,
    pub(crate) by_creator: HashMap<AccountId, Vec<MarketId>>,
}

impl MarketTable {
    pub(crate) fn insert(&mut self, market: Market) {
        self.by_creator
            .entry(market.creator.clone())
            .or_default()
            .push(market.id);
        self.markets.insert(market.id, Arc::new(Mutex::new(market)));
    }
}

/// Authoritative store of markets and stakes.
///
/// `Ledger` is `Send + Sync`; share it between threads with an `Arc`.
pub struct Ledger {
    pub(crate) config: LedgerConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) authority: Arc<dyn ResolverAuthority>,
    pub(crate) next_id: AtomicU64,
    pub(crate) table: RwLock<MarketTable>,
}

/// Wires configuration and collaborators into a [`Ledger`].
pub struct LedgerBuilder {
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    authority: Arc<dyn ResolverAuthority>,
}

impl Default for LedgerBuilder {
    fn default() -> Self {
        Self {
            config: LedgerConfig::default(),
            clock: Arc::new(SystemClock),
            events: Arc::new(NullSink),
            authority: Arc::new(AnyResolver),
        }
    }
}

impl LedgerBuilder {
    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_events(mut self, events: impl EventSink + 'static) -> Self {
        self.events = Arc::new(events);
        self
    }

    pub fn with_authority(mut self, authority: impl ResolverAuthority + 'static) -> Self {
        self.authority = Arc::new(authority);
        self
    }

    /// Validate the configuration and build an empty ledger.
    pub fn build(self) -> Result<Ledger> {
        self.config.validate()?;
        Ok(Ledger {
            config: self.config,
            clock: self.clock,
            events: self.events,
            authority: self.authority,
            next_id: AtomicU64::new(1),
            table: RwLock::new(MarketTable::default()),
        })
    }
}

fn lock_market(market: &Mutex<Market>) -> MutexGuard<'_, Market> {
    market.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Ledger {
    /// Builder with the default configuration, the system clock, no event
    /// sink and no resolver restriction.
    pub fn builder() -> LedgerBuilder {
        LedgerBuilder::default()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Current time according to the ledger's clock
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub(crate) fn read_table(&self) -> RwLockReadGuard<'_, MarketTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_table(&self) -> RwLockWriteGuard<'_, MarketTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn market(&self, market_id: MarketId) -> Result<Arc<Mutex<Market>>> {
        self.read_table()
            .markets
            .get(&market_id)
            .cloned()
            .ok_or(MarketError::NotFound(market_id))
    }

    fn publish(&self, at: u64, kind: EventKind) {
        self.events.publish(&LedgerEvent::new(at, kind));
    }

    /// Open a new market and return its id.
    ///
    /// # Arguments
    /// * `creator` - Account opening the market (informational)
    /// * `question` - Non-empty market question
    /// * `options` - At least two distinct outcome labels
    /// * `duration` - Seconds from now until betting closes
    pub fn create_market(
        &self,
        creator: &str,
        question: &str,
        options: Vec<String>,
        duration: u64,
    ) -> Result<MarketId> {
        let mut table = self.write_table();
        let now = self.clock.now();

        // The table write lock makes reserve-then-commit of the id race free;
        // a rejected market does not consume an id.
        let id = MarketId(self.next_id.load(Ordering::SeqCst));
        let market = Market::new(
            id,
            creator.to_string(),
            question.to_string(),
            options,
            now,
            duration,
            self.config.max_options,
        )?;
        self.next_id.fetch_add(1, Ordering::SeqCst);

        let event = EventKind::MarketCreated {
            market_id: id,
            question: market.question.clone(),
            creator: market.creator.clone(),
            options: market.options.clone(),
            deadline: market.deadline,
        };
        debug!(
            "created market {id} with {} options, deadline {}",
            market.option_count(),
            market.deadline
        );
        table.insert(market);
        self.publish(now, event);

        Ok(id)
    }

    /// Add `amount` to `bettor`'s stake on one option of an open market.
    pub fn place_bet(
        &self,
        market_id: MarketId,
        bettor: &str,
        option_index: usize,
        amount: u64,
    ) -> Result<()> {
        let entry = self.market(market_id)?;
        let mut market = lock_market(&entry);
        let now = self.clock.now();

        market.place_bet(bettor, option_index, amount, now, self.config.min_bet)?;

        debug!(
            "market {market_id}: {bettor} staked {amount} on option {option_index}, pool {}",
            market.total_pool
        );
        self.publish(
            now,
            EventKind::BetPlaced {
                market_id,
                bettor: bettor.to_string(),
                option_index,
                amount,
            },
        );

        Ok(())
    }

    /// Declare the winning option. The first successful call wins; every
    /// later call fails with [`MarketError::AlreadyResolved`].
    pub fn resolve_market(
        &self,
        market_id: MarketId,
        winning_option: usize,
        resolver: &str,
    ) -> Result<()> {
        if !self.authority.is_resolver(resolver) {
            warn!("market {market_id}: rejected resolution by unauthorized {resolver}");
            return Err(MarketError::Unauthorized(resolver.to_string()));
        }

        let entry = self.market(market_id)?;
        let mut market = lock_market(&entry);
        let now = self.clock.now();

        if let Err(e) = market.resolve(winning_option, resolver, now) {
            warn!("market {market_id}: resolution by {resolver} rejected: {e}");
            return Err(e);
        }

        debug!("market {market_id}: resolved to option {winning_option} by {resolver}");
        self.publish(
            now,
            EventKind::MarketResolved {
                market_id,
                winning_option,
                resolver: resolver.to_string(),
            },
        );

        Ok(())
    }

    /// Pay out `claimant`'s winning stake and zero it.
    ///
    /// Returns the payout; moving the funds is the caller's next step (see
    /// [`Ledger::claim_and_disburse`]). A second claim by the same claimant
    /// fails with [`MarketError::NoWinningStake`].
    pub fn claim_winnings(&self, market_id: MarketId, claimant: &str) -> Result<u64> {
        let entry = self.market(market_id)?;
        let mut market = lock_market(&entry);

        let payout = market.take_winnings(claimant)?;

        debug!(
            "market {market_id}: {claimant} claimed {payout}, paid out {} of {}",
            market.paid_out, market.total_pool
        );
        self.publish(
            self.clock.now(),
            EventKind::WinningsClaimed {
                market_id,
                claimant: claimant.to_string(),
                amount: payout,
            },
        );

        Ok(payout)
    }

    /// Claim, then hand the payout to `transfer`.
    ///
    /// The transfer runs after the market lock is released and the stake is
    /// already zeroed. If it fails the claim stays committed and the error
    /// carries the owed amount so the caller can retry the transfer.
    pub fn claim_and_disburse(
        &self,
        market_id: MarketId,
        claimant: &str,
        transfer: &dyn ValueTransfer,
    ) -> Result<u64> {
        let amount = self.claim_winnings(market_id, claimant)?;

        transfer
            .disburse(market_id, claimant, amount)
            .map_err(|e| {
                warn!("market {market_id}: disbursement of {amount} to {claimant} failed: {e:#}");
                MarketError::Disbursement {
                    market_id,
                    claimant: claimant.to_string(),
                    amount,
                    reason: format!("{e:#}"),
                }
            })?;

        Ok(amount)
    }

    /// Consistent copy of a market.
    pub fn get_market(&self, market_id: MarketId) -> Result<MarketView> {
        let entry = self.market(market_id)?;
        let market = lock_market(&entry);
        Ok(market.view(self.clock.now()))
    }

    /// Stake of `bettor` on one option (zero if they never staked on it).
    pub fn get_stake(&self, market_id: MarketId, bettor: &str, option_index: usize) -> Result<u64> {
        let entry = self.market(market_id)?;
        let market = lock_market(&entry);
        market.stake(bettor, option_index)
    }

    /// Stakes of `bettor` on every option of a market.
    pub fn get_stakes_of(&self, market_id: MarketId, bettor: &str) -> Result<Vec<u64>> {
        let entry = self.market(market_id)?;
        let market = lock_market(&entry);
        Ok(market.stakes_of(bettor))
    }

    /// Total staked on one option.
    pub fn get_option_pool(&self, market_id: MarketId, option_index: usize) -> Result<u64> {
        let entry = self.market(market_id)?;
        let market = lock_market(&entry);
        market.option_pool(option_index)
    }

    /// Ids of every market opened by `creator`, ascending.
    pub fn get_markets_by_creator(&self, creator: &str) -> Vec<MarketId> {
        self.read_table()
            .by_creator
            .get(creator)
            .cloned()
            .unwrap_or_default()
    }

    /// Views of every market, ascending by id.
    pub fn list_markets(&self) -> Vec<MarketView> {
        let now = self.clock.now();
        let entries = self
            .read_table()
            .markets
            .values()
            .cloned()
            .collect::<Vec<_>>();
        entries
            .iter()
            .map(|entry| lock_market(entry).view(now))
            .collect()
    }

    /// Number of markets ever created
    pub fn market_count(&self) -> usize {
        self.read_table().markets.len()
    }

    /// What a claim by `claimant` would pay right now, without claiming.
    ///
    /// Zero while the market is unresolved or the claimant has nothing left
    /// on the winning option.
    pub fn preview_payout(&self, market_id: MarketId, claimant: &str) -> Result<u64> {
        let entry = self.market(market_id)?;
        let market = lock_market(&entry);
        match market.claimable(claimant) {
            Ok((_, _, payout)) => Ok(payout),
            Err(MarketError::NotResolved(_) | MarketError::NoWinningStake(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Re-check the accounting invariants of one market.
    pub fn verify_invariants(&self, market_id: MarketId) -> Result<()> {
        let entry = self.market(market_id)?;
        let market = lock_market(&entry);
        market.check_invariants()
    }

    /// Re-check the accounting invariants of every market.
    pub fn verify_all(&self) -> Result<()> {
        let entries = self
            .read_table()
            .markets
            .values()
            .cloned()
            .collect::<Vec<_>>();
        entries
            .iter()
            .try_for_each(|entry| lock_market(entry).check_invariants())
    }
}
