// ABOUTME: Bounded exponential backoff for transient marketplace failures
// ABOUTME: Retries only errors classified retryable, honoring server retry-after hints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Quayside Commerce

//! # Retry Policy
//!
//! Classifies failures through [`AppError::is_retryable`] and re-attempts
//! only transient ones (`MarketplaceUnavailable`, `RateLimited`) with
//! bounded exponential backoff. Fatal errors such as auth rejections and
//! malformed credentials surface on the first attempt.
//!
//! When the marketplace supplies a retry-after hint (HTTP 429), that hint
//! takes precedence over the computed delay.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetrySettings;
use crate::errors::AppResult;

/// Bounded exponential backoff policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with explicit bounds. `max_attempts` counts the first
    /// try, so `3` means at most two retries.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            base_delay,
            max_delay,
        }
    }

    /// Build a policy from configuration settings.
    #[must_use]
    pub const fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.max_attempts, settings.base_delay, settings.max_delay)
    }

    /// Delay for a given 0-based attempt: `base * 2^attempt`, capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run an operation, retrying transient failures with backoff.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// non-retryable error immediately.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = err.retry_after().unwrap_or_else(|| self.delay_for(attempt));
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        use crate::constants::retries;
        Self::new(
            retries::DEFAULT_MAX_ATTEMPTS,
            Duration::from_millis(retries::DEFAULT_BASE_DELAY_MS),
            Duration::from_millis(retries::DEFAULT_MAX_DELAY_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::errors::AppError;

    #[test]
    fn exponential_delay_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(10), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn retries_transient_until_exhausted() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5));
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = policy
            .run("always_unavailable", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::unavailable("503")) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5));
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = policy
            .run("auth_failure", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::auth_failed("401")) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5));
        let calls = AtomicU32::new(0);
        let result = policy
            .run("eventually_ok", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AppError::unavailable("502"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
