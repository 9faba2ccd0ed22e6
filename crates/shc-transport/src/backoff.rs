// SPDX-License-Identifier: MIT OR Apache-2.0
//! Exponential backoff policy for stream reconnection.

use serde::{Deserialize, Serialize};
use shc_core::duration_millis;
use std::time::Duration;

/// Reconnect backoff: `min(base * 2^attempt, cap)`.
///
/// The attempt counter is owned by the reconnect loop and reset to zero on
/// the next successful connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt.
    #[serde(with = "duration_millis")]
    pub base: Duration,
    /// Upper bound on the backoff delay.
    #[serde(with = "duration_millis")]
    pub cap: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            cap: Duration::from_secs(300),
        }
    }
}

impl ReconnectPolicy {
    /// Backoff delay after `attempt` consecutive failures (zero-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = 2u64.saturating_pow(attempt);
        let delay_ms = (self.base.as_millis() as u64).saturating_mul(exp);
        Duration::from_millis(delay_ms.min(self.cap.as_millis() as u64))
    }
}
