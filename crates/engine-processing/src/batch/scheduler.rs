use crate::{
    batch::{
        handler::{BatchHandler, BatchRequest, ItemFailure, ItemSuccess},
        sizing::{AdaptiveSizer, SizeAdjustment, SizingConfig},
    },
    error::{BatchError, SizingError},
};
use engine_core::metrics::ImportMetrics;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub sizing: SizingConfig,
    /// When false the first batch with an item failure halts the run.
    pub continue_on_error: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            sizing: SizingConfig::default(),
            continue_on_error: true,
        }
    }
}

impl SchedulerConfig {
    pub fn new(sizing: SizingConfig) -> Self {
        SchedulerConfig {
            sizing,
            continue_on_error: true,
        }
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}

/// Scheduler bookkeeping as seen after each settled batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchState {
    pub current_batch_size: usize,
    pub processed_count: usize,
    pub total_items: usize,
    pub batches_dispatched: usize,
    pub is_processing: bool,
    pub is_cancelled: bool,
    pub last_batch_duration: Option<Duration>,
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    Completed,
    Cancelled,
    /// An item failed while `continue_on_error` was off.
    Halted,
    /// The handler returned an error for a whole batch.
    Fatal(BatchError),
}

#[derive(Debug, Clone)]
pub struct SchedulerReport<T, R> {
    pub successes: Vec<ItemSuccess<R>>,
    pub failures: Vec<ItemFailure<T>>,
    pub termination: Termination,
    pub state: BatchState,
    pub dispatched_sizes: Vec<usize>,
}

impl<T, R> SchedulerReport<T, R> {
    pub fn cancelled(&self) -> bool {
        self.termination == Termination::Cancelled
    }

    pub fn errored(&self) -> bool {
        self.termination == Termination::Halted
    }

    pub fn fatal_error(&self) -> Option<&BatchError> {
        match &self.termination {
            Termination::Fatal(err) => Some(err),
            _ => None,
        }
    }

    /// Indices that never reached a settled batch.
    pub fn pending_indices(&self) -> std::ops::Range<usize> {
        self.state.processed_count..self.state.total_items
    }
}

/// Drives items through a [`BatchHandler`] one batch at a time, resizing
/// batches from observed latency. Cancellation is honoured only between
/// batches; an in-flight batch always settles.
pub struct BatchScheduler {
    config: SchedulerConfig,
    sizer: AdaptiveSizer,
    cancel: CancellationToken,
    metrics: ImportMetrics,
}

impl BatchScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, SizingError> {
        let sizer = AdaptiveSizer::new(config.sizing.clone())?;
        Ok(BatchScheduler {
            config,
            sizer,
            cancel: CancellationToken::new(),
            metrics: ImportMetrics::new(),
        })
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_metrics(mut self, metrics: ImportMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ImportMetrics {
        &self.metrics
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Clone of the token; cancelling it stops the scheduler at the next batch edge.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn run<T, R, H, P>(
        &self,
        items: Vec<T>,
        handler: &H,
        mut on_progress: P,
    ) -> SchedulerReport<T, R>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        H: BatchHandler<T, R> + ?Sized,
        P: FnMut(&BatchState),
    {
        let total = items.len();
        let mut sizer = self.sizer.clone();
        sizer.reset();

        let mut state = BatchState {
            current_batch_size: sizer.current(),
            total_items: total,
            is_processing: true,
            ..Default::default()
        };
        let mut successes = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut dispatched_sizes = Vec::new();
        let mut cursor = 0;

        info!(
            total_items = total,
            initial_size = sizer.current(),
            continue_on_error = self.config.continue_on_error,
            "Batch run started"
        );

        let termination = loop {
            if self.cancel.is_cancelled() {
                state.is_cancelled = true;
                info!(
                    processed = state.processed_count,
                    remaining = total - cursor,
                    "Cancellation observed, no further batches dispatched"
                );
                break Termination::Cancelled;
            }
            if cursor >= total {
                break Termination::Completed;
            }

            let size = sizer.current().min(total - cursor);
            let batch_number = state.batches_dispatched + 1;
            let request = BatchRequest {
                batch_number,
                start_index: cursor,
                items: items[cursor..cursor + size].to_vec(),
            };

            let started = Instant::now();
            let result = handler.handle(request).await;
            let elapsed = started.elapsed();

            state.batches_dispatched = batch_number;
            state.last_batch_duration = Some(elapsed);
            dispatched_sizes.push(size);

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(
                        batch = batch_number,
                        size,
                        error = %err,
                        "Batch handler failed, abandoning remaining batches"
                    );
                    self.metrics.record_batch(0, 0, elapsed);
                    break Termination::Fatal(err);
                }
            };

            let range = cursor..cursor + size;
            let mut settled = vec![false; size];

            for success in outcome.successes {
                if !claim(&mut settled, &range, success.index, batch_number) {
                    continue;
                }
                successes.push(success);
            }

            let mut batch_failures = 0;
            for failure in outcome.failures {
                if !claim(&mut settled, &range, failure.index, batch_number) {
                    continue;
                }
                batch_failures += 1;
                failures.push(ItemFailure {
                    index: failure.index,
                    item: items[failure.index].clone(),
                    error: failure.error,
                });
            }

            for (offset, done) in settled.iter().enumerate() {
                if !done {
                    let index = cursor + offset;
                    batch_failures += 1;
                    failures.push(ItemFailure {
                        index,
                        item: items[index].clone(),
                        error: "batch handler reported no outcome for item".to_string(),
                    });
                }
            }

            cursor += size;
            state.processed_count = cursor;
            self.metrics
                .record_batch(size as u64, batch_failures as u64, elapsed);

            if sizer.observe(elapsed) != SizeAdjustment::Held {
                self.metrics.increment_resizes();
            }
            state.current_batch_size = sizer.current();

            info!(
                batch = batch_number,
                size,
                failed = batch_failures,
                duration_ms = elapsed.as_millis() as u64,
                processed = state.processed_count,
                total_items = total,
                next_size = state.current_batch_size,
                "Batch settled"
            );

            on_progress(&state);

            if batch_failures > 0 && !self.config.continue_on_error {
                warn!(
                    batch = batch_number,
                    failed = batch_failures,
                    "Item failures with continue_on_error disabled, halting"
                );
                break Termination::Halted;
            }
        };

        state.is_processing = false;
        info!(
            batches = state.batches_dispatched,
            processed = state.processed_count,
            succeeded = successes.len(),
            failed = failures.len(),
            termination = ?termination,
            "Batch run finished"
        );

        SchedulerReport {
            successes,
            failures,
            termination,
            state,
            dispatched_sizes,
        }
    }
}

/// Marks `index` settled; out-of-batch and repeated indices are ignored.
fn claim(
    settled: &mut [bool],
    range: &std::ops::Range<usize>,
    index: usize,
    batch_number: usize,
) -> bool {
    if !range.contains(&index) {
        warn!(
            batch = batch_number,
            index, "Handler reported an index outside its batch"
        );
        return false;
    }
    let slot = &mut settled[index - range.start];
    if *slot {
        warn!(
            batch = batch_number,
            index, "Handler reported the same item twice"
        );
        return false;
    }
    *slot = true;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::handler::BatchOutcome;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio::time::sleep;

    fn config(initial: usize, min: usize, max: usize) -> SchedulerConfig {
        SchedulerConfig::new(
            SizingConfig::default()
                .with_bounds(initial, min, max)
                .with_target_latency(Duration::from_millis(10)),
        )
    }

    fn echo(request: BatchRequest<usize>) -> BatchOutcome<usize> {
        let mut outcome = BatchOutcome::new();
        for (index, item) in request.indexed() {
            outcome.succeed(index, *item);
        }
        outcome
    }

    #[tokio::test(start_paused = true)]
    async fn slow_batches_shrink_toward_minimum() {
        let scheduler = BatchScheduler::new(config(10, 5, 20)).unwrap();
        let handler = |request: BatchRequest<usize>| async move {
            sleep(Duration::from_millis(50)).await;
            Ok::<_, BatchError>(echo(request))
        };

        let report = scheduler
            .run((0..25).collect(), &handler, |_| {})
            .await;

        assert_eq!(report.termination, Termination::Completed);
        assert_eq!(report.dispatched_sizes, vec![10, 5, 5, 5]);
        assert!(report.dispatched_sizes.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(report.dispatched_sizes.iter().sum::<usize>(), 25);
        assert_eq!(report.successes.len(), 25);
        assert_eq!(scheduler.metrics().snapshot().batch_resizes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_batches_grow_and_sum_to_total() {
        let scheduler = BatchScheduler::new(config(5, 5, 40)).unwrap();
        let handler = |request: BatchRequest<usize>| async move { Ok::<_, BatchError>(echo(request)) };

        let report = scheduler.run((0..103).collect(), &handler, |_| {}).await;

        assert_eq!(report.dispatched_sizes[..6], [5, 7, 10, 15, 22, 33]);
        assert_eq!(report.dispatched_sizes.iter().sum::<usize>(), 103);
        let indices: Vec<usize> = report.successes.iter().map(|s| s.index).collect();
        assert_eq!(indices, (0..103).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn empty_input_completes_without_dispatch() {
        let scheduler = BatchScheduler::new(config(10, 5, 20)).unwrap();
        let handler = |request: BatchRequest<usize>| async move { Ok::<_, BatchError>(echo(request)) };

        let report = scheduler.run(Vec::new(), &handler, |_| {}).await;
        assert_eq!(report.termination, Termination::Completed);
        assert!(report.dispatched_sizes.is_empty());
        assert!(!report.state.is_processing);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_third_batch_stops_after_it() {
        let scheduler = BatchScheduler::new(config(5, 5, 5)).unwrap();
        let token = scheduler.cancel_token();
        let handler = move |request: BatchRequest<usize>| {
            let token = token.clone();
            async move {
                if request.batch_number == 3 {
                    token.cancel();
                }
                sleep(Duration::from_millis(5)).await;
                Ok::<_, BatchError>(echo(request))
            }
        };

        let report = scheduler.run((0..25).collect(), &handler, |_| {}).await;

        assert!(report.cancelled());
        assert_eq!(report.dispatched_sizes, vec![5, 5, 5]);
        assert_eq!(report.successes.len() + report.failures.len(), 15);
        assert_eq!(report.pending_indices(), 15..25);
        assert!(report.state.is_cancelled);
    }

    #[tokio::test]
    async fn missing_and_foreign_indices_become_failures() {
        let scheduler = BatchScheduler::new(config(4, 1, 4)).unwrap();
        let handler = |request: BatchRequest<usize>| async move {
            let mut outcome = BatchOutcome::new();
            let start = request.start_index;
            outcome.succeed(start, 0usize);
            outcome.succeed(start, 0usize);
            outcome.fail(start + 1, "rejected");
            outcome.succeed(start + 100, 0usize);
            Ok::<_, BatchError>(outcome)
        };

        let report = scheduler.run(vec![10, 11, 12, 13], &handler, |_| {}).await;

        assert_eq!(report.successes.len(), 1);
        assert_eq!(report.failures.len(), 3);
        assert_eq!(report.failures[0].item, 11);
        assert_eq!(report.failures[0].error, "rejected");
        assert!(
            report.failures[1..]
                .iter()
                .all(|f| f.error.contains("no outcome"))
        );
    }

    #[tokio::test]
    async fn halts_on_first_failure_without_continue_on_error() {
        let scheduler =
            BatchScheduler::new(config(2, 2, 2).with_continue_on_error(false)).unwrap();
        let handler = |request: BatchRequest<usize>| async move {
            let mut outcome = BatchOutcome::new();
            for (index, item) in request.indexed() {
                if *item == 3 {
                    outcome.fail(index, "bad item");
                } else {
                    outcome.succeed(index, *item);
                }
            }
            Ok::<_, BatchError>(outcome)
        };

        let report = scheduler.run((0..8).collect(), &handler, |_| {}).await;

        assert!(report.errored());
        assert_eq!(report.dispatched_sizes, vec![2, 2]);
        assert_eq!(report.successes.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.pending_indices(), 4..8);
    }

    #[tokio::test]
    async fn handler_error_is_fatal() {
        let scheduler = BatchScheduler::new(config(3, 1, 3)).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handler = move |request: BatchRequest<usize>| {
            let calls = counter.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                    return Err(BatchError::fatal("connection reset"));
                }
                Ok(echo(request))
            }
        };

        let report = scheduler.run((0..9).collect(), &handler, |_| {}).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.fatal_error(), Some(&BatchError::fatal("connection reset")));
        assert_eq!(report.successes.len(), 3);
        assert_eq!(report.pending_indices(), 3..9);
    }

    #[tokio::test]
    async fn progress_fires_after_every_batch() {
        let scheduler = BatchScheduler::new(config(4, 4, 4)).unwrap();
        let handler = |request: BatchRequest<usize>| async move { Ok::<_, BatchError>(echo(request)) };
        let seen = Mutex::new(Vec::new());

        scheduler
            .run((0..10).collect(), &handler, |state| {
                seen.lock().unwrap().push((state.batches_dispatched, state.processed_count));
            })
            .await;

        assert_eq!(seen.into_inner().unwrap(), vec![(1, 4), (2, 8), (3, 10)]);
    }
}
