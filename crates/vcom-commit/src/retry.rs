//! Retry with exponential backoff for ledger submissions.
//!
//! Only failures the caller classifies as transient are retried. Anything
//! else is returned after the first attempt.

use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` total calls (at least one), delays starting at
    /// `base_delay` and doubling up to `max_delay`.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Total attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// A call that did not succeed.
#[derive(Debug)]
pub struct RetryFailure<E> {
    /// Calls made.
    pub attempts: u32,
    /// Last error seen.
    pub error: E,
}

/// Call `f` until it succeeds, fails permanently, or attempts run out.
///
/// `f` receives the 1-based attempt number.
pub async fn retry_transient<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_transient: impl Fn(&E) -> bool,
    mut f: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match f(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if !is_transient(&error) => {
                return Err(RetryFailure {
                    attempts: attempt,
                    error,
                });
            }
            Err(error) if attempt >= policy.max_attempts => {
                return Err(RetryFailure {
                    attempts: attempt,
                    error,
                });
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    "transient failure, retrying in {delay:?}: {error}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(200), Duration::from_secs(1))
    }

    #[test]
    fn delays_double_and_cap() {
        let p = policy(10);
        assert_eq!(p.delay_after(1), Duration::from_millis(200));
        assert_eq!(p.delay_after(2), Duration::from_millis(400));
        assert_eq!(p.delay_after(3), Duration::from_millis(800));
        assert_eq!(p.delay_after(4), Duration::from_secs(1));
        assert_eq!(p.delay_after(40), Duration::from_secs(1));
    }

    #[test]
    fn at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_all_attempts_on_transient_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient(&policy(4), |_: &String| true, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("connection refused".to_string()) }
        })
        .await;
        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient(&policy(4), |_: &String| false, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("rejected".to_string()) }
        })
        .await;
        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let started = tokio::time::Instant::now();
        let result = retry_transient(&policy(4), |_: &String| true, |attempt| async move {
            if attempt < 3 {
                Err(format!("attempt {attempt} failed"))
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert!(started.elapsed() >= Duration::from_millis(600));
    }
}
