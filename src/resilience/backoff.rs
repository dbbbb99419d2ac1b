//! Capped exponential backoff for accept retries.

use std::time::Duration;

/// Delay applied after the first temporary accept failure.
pub const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(5);

/// Upper bound for any single accept retry delay.
pub const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Calculate the exponential backoff delay for the given attempt.
///
/// Attempt `0` means "no failure yet" and yields a zero delay. Attempt `n`
/// yields `min(base * 2^(n-1), max)`.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u32.saturating_pow(attempt - 1);
    base.saturating_mul(factor).min(max)
}

/// Backoff state for a single accept loop.
///
/// Counts consecutive temporary failures; [`reset`](Self::reset) is called on
/// every successful accept.
#[derive(Debug, Clone)]
pub struct AcceptBackoff {
    failures: u32,
    base: Duration,
    max: Duration,
}

impl AcceptBackoff {
    /// Backoff starting at 5 ms and capped at 1 s.
    pub fn new() -> Self {
        Self {
            failures: 0,
            base: ACCEPT_BACKOFF_BASE,
            max: ACCEPT_BACKOFF_MAX,
        }
    }

    /// Record one more consecutive failure and return how long to wait.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        calculate_backoff(self.failures, self.base, self.max)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Number of consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl Default for AcceptBackoff {
    fn default() -> Self {
        Self::new()
    }
}
