use crate::{
    batch::handler::{BatchHandler, BatchOutcome, BatchRequest},
    error::BatchError,
};
use async_trait::async_trait;
use engine_core::{
    metrics::ImportMetrics,
    retry::{RetryDisposition, RetryError, RetryPolicy},
};
use std::time::Duration;
use tracing::warn;

/// Fails a batch call that does not settle within `limit`.
pub struct TimeoutHandler<H> {
    inner: H,
    limit: Duration,
}

impl<H> TimeoutHandler<H> {
    pub fn new(inner: H, limit: Duration) -> Self {
        TimeoutHandler { inner, limit }
    }
}

#[async_trait]
impl<H, T, R> BatchHandler<T, R> for TimeoutHandler<H>
where
    H: BatchHandler<T, R>,
    T: Send + 'static,
    R: Send + 'static,
{
    async fn handle(&self, request: BatchRequest<T>) -> Result<BatchOutcome<R>, BatchError> {
        let batch_number = request.batch_number;
        match tokio::time::timeout(self.limit, self.inner.handle(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    batch = batch_number,
                    limit_ms = self.limit.as_millis() as u64,
                    "Batch call timed out"
                );
                Err(BatchError::Timeout {
                    batch_number,
                    elapsed: self.limit,
                })
            }
        }
    }
}

/// Re-runs a batch whose error is transient, following a [`RetryPolicy`].
pub struct RetryHandler<H> {
    inner: H,
    policy: RetryPolicy,
    metrics: Option<ImportMetrics>,
}

impl<H> RetryHandler<H> {
    pub fn new(inner: H, policy: RetryPolicy) -> Self {
        RetryHandler {
            inner,
            policy,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ImportMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

fn classify(err: &BatchError) -> RetryDisposition {
    if err.is_transient() {
        RetryDisposition::Retry
    } else {
        RetryDisposition::Stop
    }
}

#[async_trait]
impl<H, T, R> BatchHandler<T, R> for RetryHandler<H>
where
    H: BatchHandler<T, R>,
    T: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    async fn handle(&self, request: BatchRequest<T>) -> Result<BatchOutcome<R>, BatchError> {
        let batch_number = request.batch_number;
        let result = self
            .policy
            .run(
                || self.inner.handle(request.clone()),
                classify,
                |attempt, err| {
                    warn!(batch = batch_number, attempt, error = %err, "Retrying batch");
                    if let Some(metrics) = &self.metrics {
                        metrics.increment_retries(1);
                    }
                },
            )
            .await;

        result.map_err(|err| match err {
            RetryError::Fatal(err) => err,
            RetryError::AttemptsExceeded { attempts, last } => BatchError::RetriesExhausted {
                attempts,
                last: Box::new(last),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio::time::sleep;

    fn request() -> BatchRequest<u8> {
        BatchRequest {
            batch_number: 7,
            start_index: 0,
            items: vec![1, 2],
        }
    }

    fn all_ok(request: &BatchRequest<u8>) -> BatchOutcome<u8> {
        let mut outcome = BatchOutcome::new();
        for (index, item) in request.indexed() {
            outcome.succeed(index, *item);
        }
        outcome
    }

    #[tokio::test(start_paused = true)]
    async fn slow_batch_times_out() {
        let slow = |request: BatchRequest<u8>| async move {
            sleep(Duration::from_secs(5)).await;
            Ok::<_, BatchError>(all_ok(&request))
        };
        let guarded = TimeoutHandler::new(slow, Duration::from_secs(1));

        let err = guarded.handle(request()).await.unwrap_err();
        assert_eq!(
            err,
            BatchError::Timeout {
                batch_number: 7,
                elapsed: Duration::from_secs(1)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fast_batch_passes_through_timeout() {
        let fast = |request: BatchRequest<u8>| async move { Ok::<_, BatchError>(all_ok(&request)) };
        let guarded = TimeoutHandler::new(fast, Duration::from_secs(1));
        assert_eq!(guarded.handle(request()).await.unwrap().successes.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let flaky = move |request: BatchRequest<u8>| {
            let calls = counter.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BatchError::transient("lock wait timeout"))
                } else {
                    Ok(all_ok(&request))
                }
            }
        };
        let metrics = ImportMetrics::new();
        let guarded = RetryHandler::new(
            flaky,
            RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(50)),
        )
        .with_metrics(metrics.clone());

        let outcome = guarded.handle(request()).await.unwrap();
        assert_eq!(outcome.successes.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.snapshot().retries, 2);
    }

    #[tokio::test]
    async fn fatal_failures_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let broken = move |_: BatchRequest<u8>| {
            let calls = counter.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<BatchOutcome<u8>, _>(BatchError::fatal("constraint violated"))
            }
        };
        let guarded = RetryHandler::new(broken, RetryPolicy::default());

        let err = guarded.handle(request()).await.unwrap_err();
        assert_eq!(err, BatchError::fatal("constraint violated"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_wrap_the_last_error() {
        let always = |_: BatchRequest<u8>| async { Err::<BatchOutcome<u8>, _>(BatchError::transient("busy")) };
        let guarded = RetryHandler::new(
            always,
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(1)),
        );

        match guarded.handle(request()).await {
            Err(BatchError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert_eq!(*last, BatchError::transient("busy"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
