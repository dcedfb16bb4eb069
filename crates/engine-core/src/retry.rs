use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};
use tokio::time::sleep;
use tracing::warn;

/// Whether a failed attempt may be repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was classified as not retryable.
    Fatal(E),
    /// Every allowed attempt failed with a retryable error.
    AttemptsExceeded { attempts: usize, last: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal(err) => err,
            RetryError::AttemptsExceeded { last, .. } => last,
        }
    }
}

/// Exponential backoff policy: `base_delay * 2^attempt`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// A single attempt, never retried.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Runs `op` until it succeeds, fails fatally or runs out of attempts.
    /// `on_retry` observes every attempt that is about to be repeated.
    pub async fn run<F, Fut, T, E, C, R>(
        &self,
        mut op: F,
        classify: C,
        mut on_retry: R,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> RetryDisposition,
        R: FnMut(usize, &E),
    {
        let mut attempt = 0;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if classify(&err) == RetryDisposition::Stop {
                return Err(RetryError::Fatal(err));
            }

            attempt += 1;
            if attempt >= self.max_attempts {
                return Err(RetryError::AttemptsExceeded {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.backoff_delay(attempt - 1);
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Retrying after transient failure"
            );
            on_retry(attempt, &err);
            sleep(delay).await;
        }
    }

    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let factor = 1u32 << attempt.min(10);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}
