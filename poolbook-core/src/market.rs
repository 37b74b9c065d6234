//! # Market Records
//!
//! A market is a single wagering event: a question, a fixed list of mutually
//! exclusive options and a betting deadline. This module holds the market
//! record with its stake table and the state transitions applied to it. The
//! [`Ledger`](crate::ledger::Ledger) owns every record and serializes access
//! to it; the methods here assume exclusive access and never touch a clock,
//! a lock or an event sink.

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{accountant, error::Result, MarketError};

/// Account identity of a creator, bettor, resolver or claimant.
pub type AccountId = String;

/// Unique market identifier, allocated sequentially by the ledger.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct MarketId(pub u64);

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MarketId {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .trim_start_matches('#')
            .parse::<u64>()
            .map(MarketId)
            .map_err(|_| MarketError::InvalidArgument(format!("Invalid market id: {s}")))
    }
}

/// Stored lifecycle state. "Closed by time" is derived from the deadline.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Open,
    Resolved,
}

/// A market together with its stake table.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Market {
    /// Sequential market identifier
    pub id: MarketId,

    /// Market question/description
    pub question: String,

    /// Outcome labels, referenced by index
    pub options: Vec<String>,

    /// Account that opened the market (informational only)
    pub creator: AccountId,

    /// Creation time (Unix timestamp)
    pub created_at: u64,

    /// No stakes are accepted at or after this time (Unix timestamp)
    pub deadline: u64,

    /// Sum of every accepted stake
    pub total_pool: u64,

    /// Sum of stakes per option
    pub pool_by_option: Vec<u64>,

    /// Lifecycle state
    pub status: MarketStatus,

    /// Winning option index (if resolved)
    pub winning_option: Option<usize>,

    /// Resolution time (if resolved)
    pub resolved_at: Option<u64>,

    /// Resolver that settled the market (if resolved)
    pub resolver: Option<AccountId>,

    /// Winning stake already claimed and zeroed
    pub claimed_stake: u64,

    /// Sum of all payouts handed out
    pub paid_out: u64,

    /// Stake per bettor, one slot per option
    stakes: HashMap<AccountId, Vec<u64>>,
}

/// Consistent read-only copy of a market, without its stake table.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MarketView {
    pub id: MarketId,
    pub question: String,
    pub options: Vec<String>,
    pub creator: AccountId,
    pub created_at: u64,
    pub deadline: u64,
    pub total_pool: u64,
    pub pool_by_option: Vec<u64>,
    pub status: MarketStatus,
    pub winning_option: Option<usize>,
    pub resolved_at: Option<u64>,
    pub resolver: Option<AccountId>,
    pub paid_out: u64,
    pub bettor_count: usize,
    /// Derived from the clock when the view was taken
    pub closed: bool,
}

impl MarketView {
    /// Decimal odds for an option, `None` while nobody has staked on it.
    pub fn odds(&self, option_index: usize) -> Option<f64> {
        self.pool_by_option
            .get(option_index)
            .and_then(|pool| accountant::implied_odds(*pool, self.total_pool))
    }

    /// Label of the winning option (if resolved)
    pub fn winning_label(&self) -> Option<&str> {
        self.winning_option
            .and_then(|index| self.options.get(index))
            .map(String::as_str)
    }

    /// Get market status summary
    pub fn status_summary(&self) -> String {
        match (self.status, self.winning_label()) {
            (MarketStatus::Resolved, Some(label)) => format!("Resolved - {label} won"),
            (MarketStatus::Resolved, None) => "Resolved - No outcome set".to_string(),
            (MarketStatus::Open, _) if self.closed => "Awaiting resolution".to_string(),
            (MarketStatus::Open, _) => "Open - Accepting bets".to_string(),
        }
    }
}

impl Market {
    /// Creates a new open market.
    ///
    /// # Arguments
    /// * `id` - Identifier allocated by the ledger
    /// * `creator` - Account opening the market
    /// * `question` - Non-empty market question
    /// * `options` - At least two distinct, non-empty outcome labels
    /// * `now` - Creation time (Unix timestamp)
    /// * `duration` - Seconds until the betting deadline, must be positive
    /// * `max_options` - Upper bound on the number of options
    pub fn new(
        id: MarketId,
        creator: AccountId,
        question: String,
        options: Vec<String>,
        now: u64,
        duration: u64,
        max_options: usize,
    ) -> Result<Self> {
        Self::validate_terms(&question, &options, max_options)?;

        if duration == 0 {
            return Err(MarketError::InvalidArgument(
                "Duration must be greater than 0".to_string(),
            ));
        }

        let deadline = now.checked_add(duration).ok_or_else(|| {
            MarketError::InvalidArgument(format!("Duration {duration} overflows the deadline"))
        })?;

        let option_count = options.len();
        Ok(Self {
            id,
            question,
            options,
            creator,
            created_at: now,
            deadline,
            total_pool: 0,
            pool_by_option: vec![0; option_count],
            status: MarketStatus::Open,
            winning_option: None,
            resolved_at: None,
            resolver: None,
            claimed_stake: 0,
            paid_out: 0,
            stakes: HashMap::new(),
        })
    }

    /// Question and option rules shared by creation and restore.
    fn validate_terms(question: &str, options: &[String], max_options: usize) -> Result<()> {
        if question.trim().is_empty() {
            return Err(MarketError::InvalidArgument(
                "Question cannot be empty".to_string(),
            ));
        }

        if options.len() < 2 {
            return Err(MarketError::InvalidArgument(format!(
                "A market needs at least 2 options, got {}",
                options.len()
            )));
        }

        if options.len() > max_options {
            return Err(MarketError::InvalidArgument(format!(
                "A market supports at most {max_options} options, got {}",
                options.len()
            )));
        }

        if options.iter().any(|option| option.trim().is_empty()) {
            return Err(MarketError::InvalidArgument(
                "Option labels cannot be empty".to_string(),
            ));
        }

        for (i, option) in options.iter().enumerate() {
            if options[..i].contains(option) {
                return Err(MarketError::InvalidArgument(format!(
                    "Duplicate option label: {option}"
                )));
            }
        }

        Ok(())
    }

    /// Re-check the creation rules on an existing record: question, option
    /// labels and a deadline strictly after creation.
    pub fn check_terms(&self, max_options: usize) -> Result<()> {
        Self::validate_terms(&self.question, &self.options, max_options)?;
        if self.deadline <= self.created_at {
            return Err(MarketError::InvalidArgument(format!(
                "Deadline {} is not after creation time {}",
                self.deadline, self.created_at
            )));
        }
        Ok(())
    }

    /// Number of options
    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    fn check_option(&self, index: usize) -> Result<()> {
        if accountant::validate_option_index(index, self.option_count()) {
            Ok(())
        } else {
            Err(MarketError::InvalidOption {
                index,
                option_count: self.option_count(),
            })
        }
    }

    /// Whether betting is over, either by time or by resolution.
    pub fn is_closed(&self, now: u64) -> bool {
        self.status == MarketStatus::Resolved || now >= self.deadline
    }

    /// Stake of `bettor` on `option_index`; zero for unknown bettors.
    pub fn stake(&self, bettor: &str, option_index: usize) -> Result<u64> {
        self.check_option(option_index)?;
        Ok(self
            .stakes
            .get(bettor)
            .and_then(|slots| slots.get(option_index))
            .copied()
            .unwrap_or(0))
    }

    /// Stakes of `bettor` on every option.
    pub fn stakes_of(&self, bettor: &str) -> Vec<u64> {
        self.stakes
            .get(bettor)
            .cloned()
            .unwrap_or_else(|| vec![0; self.option_count()])
    }

    /// Pool of a single option.
    pub fn option_pool(&self, option_index: usize) -> Result<u64> {
        self.check_option(option_index)?;
        Ok(self.pool_by_option[option_index])
    }

    /// Take a consistent read-only copy.
    pub fn view(&self, now: u64) -> MarketView {
        MarketView {
            id: self.id,
            question: self.question.clone(),
            options: self.options.clone(),
            creator: self.creator.clone(),
            created_at: self.created_at,
            deadline: self.deadline,
            total_pool: self.total_pool,
            pool_by_option: self.pool_by_option.clone(),
            status: self.status,
            winning_option: self.winning_option,
            resolved_at: self.resolved_at,
            resolver: self.resolver.clone(),
            paid_out: self.paid_out,
            bettor_count: self.stakes.len(),
            closed: self.is_closed(now),
        }
    }

    /// Record a stake.
    ///
    /// The three sums are computed first and written together, so a failure
    /// (including overflow) leaves the market untouched.
    pub(crate) fn place_bet(
        &mut self,
        bettor: &str,
        option_index: usize,
        amount: u64,
        now: u64,
        min_bet: u64,
    ) -> Result<()> {
        if amount < min_bet {
            return Err(MarketError::BetTooSmall { amount, min_bet });
        }

        if self.is_closed(now) {
            return Err(MarketError::MarketClosed(self.id));
        }

        let current = self.stake(bettor, option_index)?;
        let stake = accountant::checked_add_stake(current, amount)?;
        let option_pool = accountant::checked_add_stake(self.pool_by_option[option_index], amount)?;
        let total_pool = accountant::checked_add_stake(self.total_pool, amount)?;

        let option_count = self.option_count();
        self.stakes
            .entry(bettor.to_string())
            .or_insert_with(|| vec![0; option_count])[option_index] = stake;
        self.pool_by_option[option_index] = option_pool;
        self.total_pool = total_pool;

        Ok(())
    }

    /// Settle the market on `winning_option`. Succeeds at most once.
    pub(crate) fn resolve(&mut self, winning_option: usize, resolver: &str, now: u64) -> Result<()> {
        if self.status == MarketStatus::Resolved {
            return Err(MarketError::AlreadyResolved(self.id));
        }

        if now < self.deadline {
            return Err(MarketError::TooEarly {
                deadline: self.deadline,
                now,
            });
        }

        self.check_option(winning_option)?;

        self.winning_option = Some(winning_option);
        self.status = MarketStatus::Resolved;
        self.resolved_at = Some(now);
        self.resolver = Some(resolver.to_string());

        Ok(())
    }

    /// Payout a claim by `claimant` would receive, without claiming it.
    pub fn claimable(&self, claimant: &str) -> Result<(usize, u64, u64)> {
        let winning_option = match (self.status, self.winning_option) {
            (MarketStatus::Resolved, Some(option)) => option,
            _ => return Err(MarketError::NotResolved(self.id)),
        };

        let stake = self.stake(claimant, winning_option)?;
        if stake == 0 {
            return Err(MarketError::NoWinningStake(self.id));
        }

        let winning_pool = self.pool_by_option[winning_option];
        // A nonzero stake is part of its option pool.
        debug_assert!(winning_pool >= stake, "winning pool smaller than a winning stake");
        let payout = accountant::compute_payout(stake, winning_pool, self.total_pool)?;

        Ok((winning_option, stake, payout))
    }

    /// Compute the claimant's payout and zero their winning stake in one step.
    pub(crate) fn take_winnings(&mut self, claimant: &str) -> Result<u64> {
        let (winning_option, stake, payout) = self.claimable(claimant)?;
        let paid_out = accountant::checked_add_stake(self.paid_out, payout)?;

        if let Some(slots) = self.stakes.get_mut(claimant) {
            slots[winning_option] = 0;
        }
        self.claimed_stake += stake;
        self.paid_out = paid_out;

        Ok(payout)
    }

    /// Re-check every accounting invariant of this market.
    pub fn check_invariants(&self) -> Result<()> {
        let option_count = self.option_count();
        if option_count < 2 || self.pool_by_option.len() != option_count {
            return Err(MarketError::InvariantViolation(format!(
                "market {} has {} options and {} option pools",
                self.id,
                option_count,
                self.pool_by_option.len()
            )));
        }

        if !accountant::pools_balance(self.total_pool, &self.pool_by_option) {
            return Err(MarketError::InvariantViolation(format!(
                "market {} total pool {} differs from the sum of option pools",
                self.id, self.total_pool
            )));
        }

        let mut staked = vec![0u64; option_count];
        for (bettor, slots) in &self.stakes {
            if slots.len() != option_count {
                return Err(MarketError::InvariantViolation(format!(
                    "market {} stake table of {bettor} has {} slots",
                    self.id,
                    slots.len()
                )));
            }
            for (sum, stake) in staked.iter_mut().zip(slots) {
                *sum = accountant::checked_add_stake(*sum, *stake)?;
            }
        }

        match (self.status, self.winning_option) {
            (MarketStatus::Open, None) => {
                if self.claimed_stake != 0 || self.paid_out != 0 {
                    return Err(MarketError::InvariantViolation(format!(
                        "open market {} has recorded claims",
                        self.id
                    )));
                }
            }
            (MarketStatus::Resolved, Some(winning)) if winning < option_count => {
                staked[winning] = accountant::checked_add_stake(staked[winning], self.claimed_stake)?;
                if self.paid_out > self.total_pool {
                    return Err(MarketError::InvariantViolation(format!(
                        "market {} paid out {} from a pool of {}",
                        self.id, self.paid_out, self.total_pool
                    )));
                }
            }
            _ => {
                return Err(MarketError::InvariantViolation(format!(
                    "market {} status {:?} does not match winning option {:?}",
                    self.id, self.status, self.winning_option
                )));
            }
        }

        if staked != self.pool_by_option {
            return Err(MarketError::InvariantViolation(format!(
                "market {} option pools {:?} differ from summed stakes {:?}",
                self.id, self.pool_by_option, staked
            )));
        }

        Ok(())
    }
}
