// SPDX-License-Identifier: MIT OR Apache-2.0
//! Minimum-interval rate limiter.

use shc_error::{Error, ErrorKind};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Enforces a minimum spacing between successive calls.
///
/// `wait` blocks until the next slot opens or the token is cancelled. The
/// slot time is recorded *after* blocking completes, not when the waiter
/// queues up, so a burst of callers cannot anticipate future slots:
/// waiters serialize behind the internal mutex and each one pays the full
/// interval.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Limiter with an explicit minimum interval between calls.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Limiter allowing `per_second` calls per second.
    ///
    /// The cloud API default is one request per second.
    #[must_use]
    pub fn per_second(per_second: u32) -> Self {
        let per_second = per_second.max(1);
        Self::new(Duration::from_secs(1) / per_second)
    }

    /// The configured minimum interval.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until the next slot or until `ctx` is cancelled.
    pub async fn wait(&self, ctx: &CancellationToken) -> shc_error::Result<()> {
        if ctx.is_cancelled() {
            return Err(Error::cancelled());
        }
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let next_slot = previous + self.min_interval;
            let now = Instant::now();
            if next_slot > now {
                tokio::select! {
                    biased;
                    () = ctx.cancelled() => {
                        return Err(Error::new(
                            ErrorKind::Cancelled,
                            "cancelled while waiting for a rate-limit slot",
                        ));
                    }
                    () = tokio::time::sleep_until(next_slot) => {}
                }
            }
        }
        *last_call = Some(Instant::now());
        Ok(())
    }
}
