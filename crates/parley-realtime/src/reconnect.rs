//! Reconnection backoff.
//!
//! The client never opens sockets itself. The transport asks
//! [`Client::reconnect_delay`](crate::Client::reconnect_delay) how long to wait
//! after a failure, and the delay comes from this policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff policy for reconnect attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Maximum consecutive attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Whether to add up to 25% jitter to delays.
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 250,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy without jitter.
    pub fn fixed(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: initial_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
            jitter: false,
            ..Default::default()
        }
    }

    /// Delay before the first retry.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Upper bound on a single delay.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Calculate delay for a given attempt number (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay_ms = self.initial_delay_ms as f64;
        let mut delay_ms = base_delay_ms * self.multiplier.powi(attempt as i32 - 1);

        // Jitter goes on before the cap so max_delay_ms stays a hard bound.
        if self.jitter {
            delay_ms *= 1.0 + (rand::random::<f64>() * 0.25);
        }

        Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64)
    }

    /// Delay after `failures` consecutive failures, or `None` once exhausted.
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        if failures >= self.max_attempts {
            return None;
        }
        Some(self.delay_for_attempt(failures + 1))
    }
}
