//! Ledger configuration
//!
//! Initial values for the admin-mutable delays and the ledger's operating
//! limits. Every field has a default, so a partial JSON document is enough.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Default recovery delay: 3 days.
pub const DEFAULT_RECOVERY_DELAY_SECS: i64 = 3 * 24 * 60 * 60;

/// Default emergency withdrawal delay: 2 days.
pub const DEFAULT_EMERGENCY_WITHDRAW_DELAY_SECS: i64 = 2 * 24 * 60 * 60;

/// Upper bound accepted for either delay: 365 days.
pub const MAX_DELAY_SECS: i64 = 365 * 24 * 60 * 60;

/// Default cap on recipients per deposit.
pub const DEFAULT_MAX_ALLOCATIONS: usize = 100;

/// Configuration for the escrow vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Seconds after a deposit before its depositor may recover it.
    pub recovery_delay_secs: i64,
    /// Seconds between an emergency withdrawal request and its execution.
    pub emergency_withdraw_delay_secs: i64,
    /// Require adapter delegates to be whitelisted.
    pub whitelist_enabled: bool,
    /// Maximum recipients in a single deposit.
    pub max_allocations: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            recovery_delay_secs: DEFAULT_RECOVERY_DELAY_SECS,
            emergency_withdraw_delay_secs: DEFAULT_EMERGENCY_WITHDRAW_DELAY_SECS,
            whitelist_enabled: false,
            max_allocations: DEFAULT_MAX_ALLOCATIONS,
        }
    }
}

impl LedgerConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: LedgerConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_delay("recovery_delay", self.recovery_delay_secs)?;
        validate_delay("emergency_withdraw_delay", self.emergency_withdraw_delay_secs)?;
        if self.max_allocations == 0 {
            return Err(ConfigError::InvalidAllocationCap);
        }
        Ok(())
    }
}

/// Delays must lie in `0..=MAX_DELAY_SECS`.
pub fn validate_delay(name: &'static str, value: i64) -> Result<i64, ConfigError> {
    if !(0..=MAX_DELAY_SECS).contains(&value) {
        return Err(ConfigError::InvalidDelay {
            name,
            value,
            max: MAX_DELAY_SECS,
        });
    }
    Ok(value)
}
