//! Fixed-delay retry for provider calls.
//!
//! Every attempt is preceded by a short pacing pause so the terminal does
//! not throttle the account; attempts after the first also wait `delay`.
//! Only timeout-class failures are retried.

use crate::provider::ProviderError;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Wait between a timed-out attempt and the next one.
    pub delay: Duration,
    /// Pause before every attempt.
    pub pace: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(15),
            pace: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// No waiting at all. Used by tests.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            delay: Duration::ZERO,
            pace: Duration::ZERO,
        }
    }
}

/// Run `op` under `policy`, returning the last error once attempts run out.
pub fn call_with_retry<T, F>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Result<T, ProviderError>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        if attempt > 1 && !policy.delay.is_zero() {
            std::thread::sleep(policy.delay);
        }
        if !policy.pace.is_zero() {
            std::thread::sleep(policy.pace);
        }

        match op() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_timeout() && attempt < attempts => {
                warn!(
                    target: "factorsync::retry",
                    "{label}: attempt {attempt}/{attempts} timed out ({e}), retrying in {}s",
                    policy.delay.as_secs()
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
