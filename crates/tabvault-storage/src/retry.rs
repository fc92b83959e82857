use std::time::Duration;

use tabvault_types::error::{Result, VaultError};

use crate::RetryConfig;

/// Retry a closure on transient store errors with exponential backoff + jitter.
///
/// Only errors for which [`VaultError::is_transient`] holds are retried;
/// everything else (quota exhaustion, corruption) is returned immediately.
pub fn retry_transient<T>(
    config: &RetryConfig,
    op_name: &str,
    mut f: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut delays = backoff_delays(config);
    let mut attempt = 0usize;
    loop {
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                tracing::warn!(
                    "{op_name}: transient error (attempt {attempt}/{}), retrying: {e}",
                    config.max_retries,
                );
                if let Some(delay) = delays.next() {
                    sleep_with_jitter(delay);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Retry an operation while `should_retry` accepts its outcome, returning the
/// last outcome once attempts run out.
///
/// Used for operations that report failure through their value rather than
/// through `Err` (e.g. a load that fell back to the local backup).
pub fn retry_while<T>(
    config: &RetryConfig,
    op_name: &str,
    mut f: impl FnMut() -> T,
    should_retry: impl Fn(&T) -> bool,
) -> T {
    let mut delays = backoff_delays(config);
    let mut outcome = f();
    for attempt in 1..=config.max_retries {
        if !should_retry(&outcome) {
            break;
        }
        tracing::warn!(
            "{op_name}: unsuccessful (attempt {attempt}/{}), retrying",
            config.max_retries
        );
        if let Some(delay) = delays.next() {
            sleep_with_jitter(delay);
        }
        outcome = f();
    }
    outcome
}

/// The base delay before each retry: doubling from `retry_delay_ms`, capped
/// at `retry_max_delay_ms`.
pub fn backoff_delays(config: &RetryConfig) -> impl Iterator<Item = Duration> {
    let cap = config.retry_max_delay_ms;
    let mut delay_ms = config.retry_delay_ms;
    (0..config.max_retries).map(move |_| {
        let current = delay_ms.min(cap);
        delay_ms = delay_ms.saturating_mul(2);
        Duration::from_millis(current)
    })
}

fn sleep_with_jitter(delay: Duration) {
    let base = delay.as_millis() as u64;
    if base == 0 {
        return;
    }
    let jitter = rand::random::<u64>() % base;
    std::thread::sleep(Duration::from_millis(base + jitter));
}

/// Convenience for tests and callers that build a rate-limit error by hand.
pub fn rate_limited(detail: &str) -> VaultError {
    VaultError::Storage(format!(
        "{}_PER_MINUTE quota exceeded: {detail}",
        tabvault_types::error::RATE_LIMIT_MARKER
    ))
}
