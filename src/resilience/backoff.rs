//! Exponential backoff shared by datastore connects, task retries and
//! service start retries.

use std::time::Duration;

/// Upper bound on the doubling exponent
const MAX_EXPONENT: u32 = 16;

/// Delay before retrying after `attempt` (1-based): `base * 2^(attempt - 1)`
pub fn exponential_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
    base.saturating_mul(1u32 << exponent)
}
