//! Ledger configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{error::Result, MarketError, DEFAULT_MAX_OPTIONS, DEFAULT_MIN_BET};

/// Tunables of a [`Ledger`](crate::ledger::Ledger).
///
/// Every field has a default, so a partial JSON document such as
/// `{"min_bet": 100}` is a valid configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Smallest accepted stake
    pub min_bet: u64,

    /// Largest number of options a market may have
    pub max_options: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_bet: DEFAULT_MIN_BET,
            max_options: DEFAULT_MAX_OPTIONS,
        }
    }
}

impl LedgerConfig {
    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.min_bet == 0 {
            return Err(MarketError::Config(
                "min_bet must be greater than 0".to_string(),
            ));
        }
        if self.max_options < 2 {
            return Err(MarketError::Config(
                "max_options must be at least 2".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
