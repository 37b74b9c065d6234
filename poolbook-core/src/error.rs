//! Error types for poolbook-core

use thiserror::Error;

use crate::market::MarketId;

/// Result type alias for poolbook operations
pub type Result<T> = std::result::Result<T, MarketError>;

/// Error types for market operations
#[derive(Error, Debug)]
pub enum MarketError {
    /// Malformed creation parameters
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown market id
    #[error("Market {0} not found")]
    NotFound(MarketId),

    /// Betting rejected: deadline passed or market resolved
    #[error("Market {0} is closed for betting")]
    MarketClosed(MarketId),

    /// Option index out of range
    #[error("Invalid option {index}: market has {option_count} options")]
    InvalidOption { index: usize, option_count: usize },

    /// Stake below the configured minimum
    #[error("Bet of {amount} is below the minimum of {min_bet}")]
    BetTooSmall { amount: u64, min_bet: u64 },

    /// Resolution attempted before the deadline
    #[error("Resolution not allowed before deadline {deadline} (now {now})")]
    TooEarly { deadline: u64, now: u64 },

    /// Market already resolved
    #[error("Market {0} is already resolved")]
    AlreadyResolved(MarketId),

    /// Claim attempted before resolution
    #[error("Market {0} is not resolved yet")]
    NotResolved(MarketId),

    /// Nothing to claim on the winning option
    #[error("No winning stake to claim on market {0}")]
    NoWinningStake(MarketId),

    /// Payout computed against an empty winning pool
    #[error("Division by zero: winning pool is empty")]
    DivisionByZero,

    /// Caller is not accepted as resolver
    #[error("Unauthorized resolver: {0}")]
    Unauthorized(String),

    /// Pool arithmetic would overflow
    #[error("Arithmetic overflow in pool accounting")]
    ArithmeticOverflow,

    /// Ledger committed the claim but moving the funds failed
    #[error("Disbursement of {amount} to {claimant} on market {market_id} failed: {reason}")]
    Disbursement {
        market_id: MarketId,
        claimant: String,
        amount: u64,
        reason: String,
    },

    /// Snapshot rejected on restore
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Ledger invariant check failed
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serde JSON errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors while reading configuration or snapshots
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MarketError {
    /// Whether the error is a caller timing error rather than a malformed request.
    pub fn is_timing(&self) -> bool {
        matches!(
            self,
            Self::MarketClosed(_) | Self::TooEarly { .. } | Self::NotResolved(_)
        )
    }
}
