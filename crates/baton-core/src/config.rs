//! Handoff manager configuration.
//!
//! Loaded from TOML the same way gate policies are. Every field has a
//! default, so an empty document is a valid configuration:
//!
//! ```toml
//! ack_timeout_ms = 30000
//! decision_timeout_ms = 120000
//! max_attempts = 3
//! backoff_base_ms = 1000
//! backoff_max_ms = 60000
//! max_clarifications = 3
//! event_capacity = 256
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use baton_contracts::error::{BatonError, BatonResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// How long a `SENT` contract waits for the receiver's acknowledgment.
    pub ack_timeout_ms: u64,
    /// How long a `RECEIVED` contract waits for accept/reject/input-required.
    pub decision_timeout_ms: u64,
    /// Total delivery attempts before a timing-out contract is dead-lettered.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// How many times a contract may re-enter `RECEIVED` after clarification.
    pub max_clarifications: u32,
    /// Capacity of the transition broadcast channel.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 30_000,
            decision_timeout_ms: 120_000,
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
            max_clarifications: 3,
            event_capacity: 256,
        }
    }
}

impl ManagerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> BatonResult<Self> {
        let config: ManagerConfig = toml::from_str(s).map_err(|e| BatonError::Config {
            reason: format!("failed to parse manager TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> BatonResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| BatonError::Config {
            reason: format!("failed to read manager config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> BatonResult<()> {
        if self.max_attempts == 0 {
            return Err(BatonError::Config {
                reason: "max_attempts must be at least 1".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(BatonError::Config {
                reason: "event_capacity must be at least 1".to_string(),
            });
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(BatonError::Config {
                reason: format!(
                    "backoff_max_ms ({}) is below backoff_base_ms ({})",
                    self.backoff_max_ms, self.backoff_base_ms
                ),
            });
        }
        Ok(())
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_millis(self.decision_timeout_ms)
    }

    /// Delay before retry number `retry` (0-based): `base × 2^retry`, capped
    /// at `backoff_max_ms`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let cap = Duration::from_millis(self.backoff_max_ms);
        let base = Duration::from_millis(self.backoff_base_ms);
        2u32.checked_pow(retry)
            .and_then(|factor| base.checked_mul(factor))
            .map_or(cap, |delay| delay.min(cap))
    }
}
