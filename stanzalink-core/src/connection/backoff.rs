//! Reconnect Backoff
//!
//! Delay law: each scheduled attempt uses the current delay, after which the
//! delay becomes `min(max, max(delay, min) * 2)`. A successful authenticated
//! connection resets it to the initial value.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt (milliseconds).
    pub initial_delay_ms: u64,
    /// Floor applied before doubling (milliseconds).
    pub min_delay_ms: u64,
    /// Cap on any delay (milliseconds).
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            initial_delay_ms: 2_000,
            min_delay_ms: 1_000,
            max_delay_ms: 10_000,
        }
    }
}

/// Exponential reconnect backoff.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    delay_ms: u64,
}

impl Backoff {
    /// Creates a backoff at its initial delay.
    pub fn new(config: BackoffConfig) -> Self {
        Backoff {
            config,
            delay_ms: config.initial_delay_ms.min(config.max_delay_ms),
        }
    }

    /// The delay the next attempt will use.
    pub fn current(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Returns the delay for this attempt and grows it for the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_ms;
        self.delay_ms = grow(&self.config, delay);
        Duration::from_millis(delay)
    }

    /// Returns to the initial delay.
    pub fn reset(&mut self) {
        self.delay_ms = self.config.initial_delay_ms.min(self.config.max_delay_ms);
    }
}

fn grow(config: &BackoffConfig, delay_ms: u64) -> u64 {
    delay_ms
        .max(config.min_delay_ms)
        .saturating_mul(2)
        .min(config.max_delay_ms)
}
