//! Reconnection policy.
//!
//! Bounded exponential backoff for unexpected transport closures. The
//! attempt counter lives here; scheduling belongs to the client, which
//! asks for the next delay and stops when none is left.

use std::time::Duration;

/// Backoff growth factor per attempt.
const BACKOFF_FACTOR: f64 = 1.5;

/// Delay before reconnection attempt `attempt` (1-indexed):
/// `base * 1.5^(attempt-1)`.
#[must_use]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    base.mul_f64(BACKOFF_FACTOR.powi(exponent.min(i32::MAX as u32) as i32))
}

/// Reconnection attempt counter, bounded by a configured maximum.
#[derive(Debug, Default)]
pub struct ReconnectState {
    attempts: u32,
}

impl ReconnectState {
    /// Create a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts consumed so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Consume the next attempt and return its delay, or `None` when the
    /// budget is exhausted.
    pub fn next_delay(&mut self, base: Duration, max_attempts: u32) -> Option<Duration> {
        if self.attempts >= max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(backoff_delay(base, self.attempts))
    }

    /// Reset the counter. Called on every transition to `Ready`.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
