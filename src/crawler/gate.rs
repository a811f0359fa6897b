//! Concurrency gating for item-level operations
//!
//! A fixed pool of permits bounds how many downloads or per-moment comment
//! fetches run at once. Acquisition suspends the task until a slot frees
//! up; release is tied to permit drop, so it happens on every exit path.
//! Batches are dispatched as independent futures joined together: one item
//! failing never cancels its siblings.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

/// Counting-permit gate shared by all item operations of one run.
#[derive(Clone)]
pub struct ConcurrencyGate {
    permits: Arc<Semaphore>,
}

impl ConcurrencyGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Runs a future while holding one permit.
    ///
    /// The permit is dropped when the future completes or is cancelled, so
    /// a slot can never leak.
    pub async fn run<T>(&self, work: impl Future<Output = T>) -> T {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("permit pool is never closed");
        work.await
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Result of processing one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The item was fully processed in this run
    Processed,
    /// The item's artifact already existed (or the run is shutting down)
    Skipped,
    /// The item failed; siblings are unaffected
    Failed,
}

/// Aggregate result of one dispatched batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchOutcome {
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl BatchOutcome {
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Processed => self.processed += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.processed + self.skipped + self.failed
    }
}

/// Dispatches every item through the gate and awaits the whole set.
///
/// Items run concurrently up to the gate's bound; completion order is
/// whatever order their suspensions resolve in.
pub async fn dispatch_all<I, F, Fut>(gate: &ConcurrencyGate, items: I, handler: F) -> BatchOutcome
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = ItemOutcome>,
{
    let tasks: Vec<_> = items
        .into_iter()
        .map(|item| gate.run(handler(item)))
        .collect();

    let mut outcome = BatchOutcome::default();
    for result in join_all(tasks).await {
        outcome.record(result);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_gate_bounds_concurrency() {
        let gate = ConcurrencyGate::new(2);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcome = dispatch_all(&gate, 0..10, |_| {
            let current = current.clone();
            let peak = peak.clone();
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                ItemOutcome::Processed
            }
        })
        .await;

        assert_eq!(outcome.processed, 10);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_siblings() {
        let gate = ConcurrencyGate::new(3);

        let outcome = dispatch_all(&gate, 1..=5, |n| async move {
            if n == 3 {
                ItemOutcome::Failed
            } else {
                ItemOutcome::Processed
            }
        })
        .await;

        assert_eq!(outcome.processed, 4);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.total(), 5);
    }

    #[tokio::test]
    async fn test_permits_released_after_batch() {
        let gate = ConcurrencyGate::new(1);
        let outcome = dispatch_all(&gate, 0..4, |n| async move {
            if n % 2 == 0 {
                ItemOutcome::Processed
            } else {
                ItemOutcome::Skipped
            }
        })
        .await;

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(gate.available(), 1);
    }
}
