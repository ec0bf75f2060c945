use std::time::Duration;

/// Highest attempt number that may still be persisted. The attempt after this
/// one gives up and clears the stored record.
pub const MAX_ATTEMPTS: u32 = 10;

/// Pure backoff policy used by the self-managed retry path.
///
/// delay(n) = 2^n seconds. No jitter, no cap other than the attempt ceiling.
/// Saturates instead of overflowing for absurd attempt numbers.
pub fn backoff_millis(attempt: u32) -> u64 {
    2u64.saturating_pow(attempt).saturating_mul(1000)
}

pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(backoff_millis(attempt))
}

/// Backoff used by host task queues for the delegated path:
/// base * 2^(n-1), capped.
pub fn queue_backoff_millis(base_ms: u64, failures: u32, cap_ms: u64) -> u64 {
    let exp = failures.saturating_sub(1);
    base_ms.saturating_mul(2u64.saturating_pow(exp)).min(cap_ms)
}
