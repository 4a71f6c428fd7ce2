// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! Retry wrapper around upstream operations.
//!
//! Failure classes drive the policy: server-advised waits are honored and do
//! not consume attempts, temporary failures back off exponentially with
//! optional jitter, permanent failures return immediately.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::telegram::rpc::{ErrorCategory, RpcError};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, jitter: bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter,
        }
    }
}

/// Result of a wrapped operation.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, RpcError>,
    pub attempts: u32,
    pub total_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before retrying attempt `k` (1-based): base * 2^(k-1) plus
    /// jitter in [0, base).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * 2f64.powi(attempt.saturating_sub(1) as i32);
        let jitter = if self.jitter {
            rand::thread_rng().gen_range(0.0..self.base_delay.as_secs_f64().max(f64::MIN_POSITIVE))
        } else {
            0.0
        };
        Duration::from_secs_f64(exp + jitter)
    }

    /// Run `op`, retrying per classification.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let mut attempts: u32 = 0;
        let mut total_delay = Duration::ZERO;

        loop {
            attempts += 1;
            match op().await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                        total_delay,
                    }
                }
                Err(err) => match err.category() {
                    ErrorCategory::RateLimit => {
                        let seconds = match &err {
                            RpcError::FloodWait { seconds } => *seconds,
                            _ => 0,
                        };
                        let wait = Duration::from_secs(seconds as u64);
                        warn!(
                            operation,
                            attempt = attempts,
                            seconds,
                            "Rate limited, honoring server-advised wait"
                        );
                        tokio::time::sleep(wait).await;
                        total_delay += wait;
                        // Advised waits do not count against max_attempts.
                        attempts -= 1;
                    }
                    ErrorCategory::Temporary => {
                        if attempts >= self.max_attempts {
                            return RetryOutcome {
                                result: Err(err),
                                attempts,
                                total_delay,
                            };
                        }
                        let wait = self.backoff_delay(attempts);
                        debug!(
                            operation,
                            attempt = attempts,
                            wait_ms = wait.as_millis() as u64,
                            error = %err,
                            "Temporary failure, backing off"
                        );
                        tokio::time::sleep(wait).await;
                        total_delay += wait;
                    }
                    ErrorCategory::Permanent => {
                        return RetryOutcome {
                            result: Err(err),
                            attempts,
                            total_delay,
                        }
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_attempts: u32, base_secs: u64) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_secs(base_secs), false)
    }

    #[tokio::test(start_paused = true)]
    async fn temporary_errors_back_off_exponentially() {
        // n temporary failures then success: attempts == n + 1 and the total
        // delay with jitter disabled is exactly sum(base * 2^(k-1)).
        let n = 3u32;
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let outcome = policy(5, 1)
            .run("test_op", move || {
                let calls = calls2.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < n {
                        Err(RpcError::Temporary("net".into()))
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 42);
        assert_eq!(outcome.attempts, n + 1);
        // 1 + 2 + 4 seconds
        assert_eq!(outcome.total_delay, Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_fail_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let outcome = policy(5, 1)
            .run("test_op", move || {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(RpcError::PermissionDenied("nope".into()))
                }
            })
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.total_delay, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn flood_wait_does_not_consume_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();

        let outcome = policy(2, 1)
            .run("test_op", move || {
                let calls = calls2.clone();
                async move {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0 => Err(RpcError::FloodWait { seconds: 30 }),
                        1 => Err(RpcError::FloodWait { seconds: 5 }),
                        _ => Ok(()),
                    }
                }
            })
            .await;

        assert!(outcome.result.is_ok());
        // Two advised waits, then one counted successful attempt.
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.total_delay, Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_exhaust_on_persistent_temporary_failure() {
        let outcome = policy(3, 1)
            .run("test_op", || async {
                Err::<u32, _>(RpcError::Temporary("down".into()))
            })
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 3);
        // Only the first two failures sleep: 1 + 2 seconds.
        assert_eq!(outcome.total_delay, Duration::from_secs(3));
    }
}
