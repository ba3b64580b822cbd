use std::future::Future;
use std::time::Duration;

/// Errors that know whether another attempt could succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// How many attempts to make and how long to wait between them.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after the given 1-based failed attempt.
    pub backoff: fn(u32, Duration) -> Duration,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// `attempt × base_delay` between attempts.
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: |attempt, base| base * attempt,
            base_delay,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt, self.base_delay)
    }
}

/// Run `op` until it succeeds, fails terminally, or attempts run out.
///
/// Returns the last error on exhaustion.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => {
                tracing::warn!("Attempt {} failed permanently: {}", attempt, err);
                return Err(err);
            }
            Err(err) if attempt >= policy.max_attempts => {
                tracing::error!("All {} attempts failed, last error: {}", attempt, err);
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt,
                    policy.max_attempts,
                    err,
                    delay
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

    #[derive(Debug)]
    struct TestError(bool);

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "transient={}", self.0)
        }
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(1));
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            retry_with_backoff(RetryPolicy::linear(3, Duration::from_secs(1)), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError(false)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_immediately() {
        let start = tokio::time::Instant::now();
        let result: Result<u32, TestError> =
            retry_with_backoff(RetryPolicy::linear(3, Duration::from_secs(1)), |attempt| async move {
                Ok(attempt)
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result: Result<(), _> =
            retry_with_backoff(RetryPolicy::linear(3, Duration::from_secs(1)), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError(true)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff, no sleep after the final attempt.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }
}
