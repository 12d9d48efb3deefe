//! Bounded retry with exponential backoff and rate-limit waits.

use std::time::Duration;

use {
    ferry_channels::{ChatError, ErrorClass},
    ferry_config::RelayConfig,
    tracing::{debug, warn},
};

/// Terminal failure of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    /// The destination rejects us for good; retrying cannot help.
    #[error("{0}")]
    Permanent(ChatError),

    /// Every attempt failed with a transient error.
    #[error("{last} (after {attempts} attempts)")]
    Exhausted { attempts: u32, last: ChatError },

    /// Failed with an error that is not worth retrying.
    #[error("{0}")]
    Unclassified(ChatError),
}

impl RetryError {
    /// The underlying platform error.
    #[must_use]
    pub fn source_error(&self) -> &ChatError {
        match self {
            Self::Permanent(e) | Self::Unclassified(e) => e,
            Self::Exhausted { last, .. } => last,
        }
    }
}

/// Attempt budget and backoff base for one platform operation.
///
/// A rate-limit signal waits the requested period and repeats the same
/// attempt without consuming budget. A transient failure on attempt `n`
/// (1-based) waits `base_delay * 2^(n-1)` unless it was the last attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }

    /// Wait after the failed 1-based `attempt`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Drive `request` until it succeeds or reaches a terminal failure.
    ///
    /// `request` receives the current 1-based attempt number.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        mut request: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ferry_channels::Result<T>>,
    {
        let mut attempt = 1u32;
        loop {
            let err = match request(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            match err.class() {
                ErrorClass::RateLimited(wait) => {
                    warn!(
                        operation,
                        attempt,
                        wait_secs = wait.as_secs(),
                        "rate limited, waiting before repeating attempt"
                    );
                    tokio::time::sleep(wait).await;
                },
                ErrorClass::PermanentDestination => {
                    warn!(operation, attempt, error = %err, "permanent destination error");
                    return Err(RetryError::Permanent(err));
                },
                ErrorClass::Unclassified => {
                    warn!(operation, attempt, error = %err, "unclassified error, giving up");
                    return Err(RetryError::Unclassified(err));
                },
                ErrorClass::Transient if attempt >= self.max_attempts => {
                    warn!(operation, attempt, error = %err, "retries exhausted");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                },
                ErrorClass::Transient => {
                    let wait = self.backoff(attempt);
                    debug!(
                        operation,
                        attempt,
                        wait_secs = wait.as_secs(),
                        error = %err,
                        "transient error, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                },
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::{Arc, Mutex},
        tokio::time::Instant,
    };

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(5))
    }

    /// Replays `script` one entry per call and records the attempt numbers.
    fn scripted(
        script: Vec<ferry_channels::Result<u32>>,
    ) -> (
        Arc<Mutex<Vec<(u32, Instant)>>>,
        impl FnMut(u32) -> std::future::Ready<ferry_channels::Result<u32>>,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut script = script.into_iter();
        let log = Arc::clone(&seen);
        let f = move |attempt| {
            log.lock().unwrap().push((attempt, Instant::now()));
            std::future::ready(script.next().unwrap_or(Ok(0)))
        };
        (seen, f)
    }

    #[test]
    fn backoff_doubles() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_secs(5));
        assert_eq!(p.backoff(2), Duration::from_secs(10));
        assert_eq!(p.backoff(3), Duration::from_secs(20));
        assert_eq!(p.backoff(64), Duration::from_secs(5).saturating_mul(u32::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_exhaust_budget() {
        let (seen, f) = scripted(vec![
            Err(ChatError::transient("a")),
            Err(ChatError::transient("b")),
            Err(ChatError::transient("c")),
        ]);
        let start = Instant::now();
        let err = policy().run("send", f).await.unwrap_err();
        assert_eq!(err, RetryError::Exhausted {
            attempts: 3,
            last: ChatError::transient("c"),
        });
        let seen = seen.lock().unwrap();
        let attempts: Vec<u32> = seen.iter().map(|(a, _)| *a).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
        assert_eq!(seen[1].1 - start, Duration::from_secs(5));
        assert_eq!(seen[2].1 - start, Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_repeats_same_attempt() {
        let (seen, f) = scripted(vec![
            Err(ChatError::transient("a")),
            Err(ChatError::RateLimited(Duration::from_secs(42))),
            Ok(7),
        ]);
        let start = Instant::now();
        assert_eq!(policy().run("send", f).await.unwrap(), 7);
        let seen = seen.lock().unwrap();
        let attempts: Vec<u32> = seen.iter().map(|(a, _)| *a).collect();
        assert_eq!(attempts, vec![1, 2, 2]);
        assert!(seen[2].1 - seen[1].1 >= Duration::from_secs(42));
        assert_eq!(seen[2].1 - start, Duration::from_secs(47));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_do_not_consume_budget() {
        let mut script: Vec<_> = (0..10)
            .map(|_| Err(ChatError::RateLimited(Duration::from_secs(1))))
            .collect();
        script.push(Ok(1));
        let (seen, f) = scripted(script);
        assert_eq!(policy().run("send", f).await.unwrap(), 1);
        assert!(seen.lock().unwrap().iter().all(|(a, _)| *a == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_stops_immediately() {
        let (seen, f) = scripted(vec![Err(ChatError::Forbidden)]);
        let err = policy().run("send", f).await.unwrap_err();
        assert_eq!(err, RetryError::Permanent(ChatError::Forbidden));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unclassified_error_is_not_retried() {
        let (seen, f) = scripted(vec![Err(ChatError::unclassified("boom"))]);
        let err = policy().run("send", f).await.unwrap_err();
        assert!(matches!(err, RetryError::Unclassified(_)));
        assert_eq!(err.to_string(), "unclassified failure: boom");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn exhausted_message_names_attempts() {
        let err = RetryError::Exhausted {
            attempts: 3,
            last: ChatError::transient("reset"),
        };
        assert_eq!(
            err.to_string(),
            "transient transport failure: reset (after 3 attempts)"
        );
    }
}
