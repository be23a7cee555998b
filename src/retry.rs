// SPDX-License-Identifier: MIT

//! Bounded retry with exponential backoff and jitter.
//!
//! Only transient transport failures are retried; auth and rate-limit
//! errors must surface to the caller unchanged so it can make its own
//! decision (refresh, or defer the account to the next sweep).

use std::future::Future;

use rand::Rng as _;

use crate::error::AppError;

/// Retry configuration for outbound provider calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryConfig {
    /// Compute the delay for a given retry attempt (0-indexed).
    ///
    /// `min(base * 2^retry, max) + random_jitter(0..base)`
    pub fn delay_for_retry(&self, retry: u32) -> std::time::Duration {
        let exp_delay = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        let capped = exp_delay.min(self.max_delay_ms);
        let jitter = if self.base_delay_ms > 0 {
            rand::thread_rng().gen_range(0..self.base_delay_ms)
        } else {
            0
        };
        std::time::Duration::from_millis(capped + jitter)
    }
}

/// Retry an async operation while it fails with `AppError::Transient`.
///
/// Returns the first `Ok` result, the first non-transient error, or the
/// last transient error once retries are exhausted.
pub async fn retry_transient<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, AppError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let total_attempts = config.max_retries + 1;
    let mut last_err: Option<AppError> = None;

    for attempt in 0..total_attempts {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) if e.is_transient() => {
                if attempt + 1 >= total_attempts {
                    last_err = Some(e);
                    break;
                }
                let delay = config.delay_for_retry(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    total = total_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient provider error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.expect("loop must have run at least once"))
}
