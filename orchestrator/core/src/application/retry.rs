// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Retry policies for platform calls
//!
//! [`RetryPolicy`] is the exponential backoff applied to transient errors on
//! both the read and write paths. [`LogPropagationPolicy`] is the fixed-delay
//! budget for writes waiting on a freshly provisioned log destination.

use crate::domain::deploy_config::{LogPropagationConfig, RetryConfig};
use crate::domain::errors::ReconcileError;
use crate::domain::platform::PlatformError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Outcome of one failed attempt.
#[derive(Debug)]
pub enum RetryDecision {
    /// Transient; try again after backing off
    Retry(PlatformError),
    /// Terminal; surface immediately
    Fail(ReconcileError),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    min_delay: Duration,
    factor: u32,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, min_delay: Duration, factor: u32, max_delay: Duration) -> Self {
        Self {
            max_retries,
            min_delay,
            factor: factor.max(1),
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            config.min_delay,
            config.factor,
            config.max_delay,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let multiplier = self.factor.saturating_pow(exponent);
        self.min_delay
            .checked_mul(multiplier)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Run `attempt` until it succeeds, fails terminally or the budget runs out.
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, ReconcileError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RetryDecision>>,
    {
        let mut number = 1;
        loop {
            match attempt(number).await {
                Ok(value) => return Ok(value),
                Err(RetryDecision::Fail(err)) => return Err(err),
                Err(RetryDecision::Retry(err)) => {
                    if number > self.max_retries {
                        return Err(ReconcileError::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts: number,
                            source: err,
                        });
                    }
                    let delay = self.delay_for(number);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation,
                        number,
                        self.max_attempts(),
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    number += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct LogPropagationPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl LogPropagationPolicy {
    pub fn from_config(config: &LogPropagationConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            delay: config.delay,
        }
    }
}

impl Default for LogPropagationPolicy {
    fn default() -> Self {
        Self::from_config(&LogPropagationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            Duration::from_secs(1),
            2,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = policy(10);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_until_success() {
        let calls = &AtomicU32::new(0);
        let result = policy(3)
            .run("get demo", move |_| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RetryDecision::Retry(PlatformError::new("Throttling", "slow down")))
                } else {
                    Ok("done")
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exhausts_budget() {
        let calls = &AtomicU32::new(0);
        let err = policy(2)
            .run("get demo", move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(RetryDecision::Retry(PlatformError::new("Throttling", "slow down")))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            ReconcileError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fails_fast() {
        let calls = &AtomicU32::new(0);
        let err = policy(5)
            .run("get demo", move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(RetryDecision::Fail(ReconcileError::TagNotFound("env".to_string())))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ReconcileError::TagNotFound(_)));
    }
}
