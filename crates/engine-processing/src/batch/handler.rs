use crate::error::BatchError;
use async_trait::async_trait;
use std::future::Future;

/// One contiguous slice of work handed to a [`BatchHandler`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest<T> {
    /// 1-based dispatch order within the run.
    pub batch_number: usize,
    /// Global index of `items[0]`.
    pub start_index: usize,
    pub items: Vec<T>,
}

impl<T> BatchRequest<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items paired with their global indices.
    pub fn indexed(&self) -> impl Iterator<Item = (usize, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(move |(offset, item)| (self.start_index + offset, item))
    }

    pub fn end_index(&self) -> usize {
        self.start_index + self.items.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemSuccess<R> {
    pub index: usize,
    pub value: R,
}

/// A per-item failure as reported by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemError {
    pub index: usize,
    pub error: String,
}

/// A per-item failure as recorded by the scheduler, item included.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure<T> {
    pub index: usize,
    pub item: T,
    pub error: String,
}

/// Per-item results of one handler call. Indices are global.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<R> {
    pub successes: Vec<ItemSuccess<R>>,
    pub failures: Vec<ItemError>,
}

impl<R> Default for BatchOutcome<R> {
    fn default() -> Self {
        BatchOutcome {
            successes: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<R> BatchOutcome<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(&mut self, index: usize, value: R) {
        self.successes.push(ItemSuccess { index, value });
    }

    pub fn fail(&mut self, index: usize, error: impl Into<String>) {
        self.failures.push(ItemError {
            index,
            error: error.into(),
        });
    }

    pub fn with_success(mut self, index: usize, value: R) -> Self {
        self.succeed(index, value);
        self
    }

    pub fn with_failure(mut self, index: usize, error: impl Into<String>) -> Self {
        self.fail(index, error);
        self
    }
}

/// The injected work function the scheduler drives.
///
/// Item problems belong in the returned [`BatchOutcome`]; an `Err` means the
/// call itself broke and ends the whole run.
#[async_trait]
pub trait BatchHandler<T, R>: Send + Sync {
    async fn handle(&self, request: BatchRequest<T>) -> Result<BatchOutcome<R>, BatchError>;
}

#[async_trait]
impl<F, Fut, T, R> BatchHandler<T, R> for F
where
    F: Fn(BatchRequest<T>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<BatchOutcome<R>, BatchError>> + Send + 'static,
    T: Send + 'static,
    R: Send + 'static,
{
    async fn handle(&self, request: BatchRequest<T>) -> Result<BatchOutcome<R>, BatchError> {
        (self)(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closures_are_handlers() {
        let handler = |request: BatchRequest<u32>| async move {
            let mut outcome = BatchOutcome::new();
            for (index, item) in request.indexed() {
                if item % 2 == 0 {
                    outcome.succeed(index, item * 10);
                } else {
                    outcome.fail(index, "odd");
                }
            }
            Ok::<_, BatchError>(outcome)
        };

        let outcome = handler
            .handle(BatchRequest {
                batch_number: 1,
                start_index: 4,
                items: vec![2, 3],
            })
            .await
            .unwrap();

        assert_eq!(outcome.successes, vec![ItemSuccess { index: 4, value: 20 }]);
        assert_eq!(outcome.failures[0].index, 5);
    }
}
