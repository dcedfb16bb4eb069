use serde::Serialize;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

#[derive(Debug, Default)]
struct InnerMetrics {
    batches_dispatched: AtomicU64,
    items_processed: AtomicU64,
    item_failures: AtomicU64,
    batch_resizes: AtomicU64,
    batch_time_ms: AtomicU64,
    retries: AtomicU64,
}

/// Cheaply cloneable counters shared by the scheduler and its guards.
#[derive(Debug, Clone)]
pub struct ImportMetrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub batches_dispatched: u64,
    pub items_processed: u64,
    pub item_failures: u64,
    pub batch_resizes: u64,
    pub batch_time_ms: u64,
    pub retries: u64,
}

impl MetricsSnapshot {
    pub fn avg_batch_ms(&self) -> Option<f64> {
        if self.batches_dispatched == 0 {
            None
        } else {
            Some(self.batch_time_ms as f64 / self.batches_dispatched as f64)
        }
    }
}

impl ImportMetrics {
    pub fn new() -> Self {
        ImportMetrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn record_batch(&self, items: u64, failures: u64, duration: Duration) {
        self.inner.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.inner.items_processed.fetch_add(items, Ordering::Relaxed);
        self.inner.item_failures.fetch_add(failures, Ordering::Relaxed);
        self.inner
            .batch_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn increment_resizes(&self) {
        self.inner.batch_resizes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.retries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_dispatched: self.inner.batches_dispatched.load(Ordering::Relaxed),
            items_processed: self.inner.items_processed.load(Ordering::Relaxed),
            item_failures: self.inner.item_failures.load(Ordering::Relaxed),
            batch_resizes: self.inner.batch_resizes.load(Ordering::Relaxed),
            batch_time_ms: self.inner.batch_time_ms.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
        }
    }
}

impl Default for ImportMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_counters() {
        let metrics = ImportMetrics::new();
        let clone = metrics.clone();
        clone.record_batch(10, 2, Duration::from_millis(30));
        metrics.record_batch(5, 0, Duration::from_millis(10));
        clone.increment_resizes();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_dispatched, 2);
        assert_eq!(snapshot.items_processed, 15);
        assert_eq!(snapshot.item_failures, 2);
        assert_eq!(snapshot.batch_resizes, 1);
        assert_eq!(snapshot.avg_batch_ms(), Some(20.0));
    }
}
