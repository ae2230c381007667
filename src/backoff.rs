//! Reconnect delay: capped exponential backoff with jitter.
//!
//! ```text
//! ceiling(n) = min(base * 2^(n-1), cap)        n = attempt, 1-indexed
//! delay(n)   = ceiling - ceiling/4 + uniform(0, ceiling/4)
//! ```
//!
//! The jittered delay always lands in `[0.75 * ceiling, ceiling]`, so the
//! cap is a hard upper bound on any single wait.

use std::time::Duration;

use rand::Rng;

/// Un-jittered delay for attempt `n` (1-indexed).
pub fn backoff_ceiling(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(cap, |d| d.min(cap))
}

/// Jittered delay for attempt `n` (1-indexed).
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let ceiling = backoff_ceiling(attempt, base, cap);
    let quarter = ceiling / 4;
    let jitter = if quarter.is_zero() {
        Duration::ZERO
    } else {
        rand::rng().random_range(Duration::ZERO..=quarter)
    };
    ceiling - quarter + jitter
}
