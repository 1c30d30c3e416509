//! Single-pass consumption of a [`BridgingQueue`].
//!
//! # Two ways to pull
//!
//! - [`ConsumptionSequence::step`] never waits.  When another item is still
//!   outstanding it answers [`SequenceResult::Retry`] and the caller decides
//!   what to do.
//! - [`ConsumptionSequence::next`] is the async form.  Instead of spinning on
//!   `Retry` it parks the task until the outstanding item is released (or new
//!   items are fed) and then tries again.
//!
//! # Claims
//!
//! A successful pull yields a [`Claim`].  The claim dereferences to the item
//! and holds the queue's single-flight marker; dropping the claim releases
//! it.  In other words: the marker is released exactly when the consumer is
//! done looking at the item.
//!
//! # Single pass
//!
//! Once a sequence has reported `Finished` it stays finished, even if more
//! items are fed afterwards.  Create a new sequence for the next drain pass.

use std::ops::Deref;
use std::sync::Arc;

use super::bridging::{BridgingQueue, NextResult};

/// Outcome of one [`ConsumptionSequence::step`].
#[derive(Debug)]
pub enum SequenceResult<C> {
    /// An item is ready.
    Success(C),
    /// Another item is still being processed; step again later.
    Retry,
    /// Nothing left.  The sequence is now exhausted.
    Finished,
}

/// An item pulled from a [`BridgingQueue`], holding its single-flight marker.
pub struct Claim<T> {
    item: Option<T>,
    queue: Arc<BridgingQueue<T>>,
}

impl<T> Claim<T> {
    /// Releases the marker now instead of at the end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl<T> Deref for Claim<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // `item` is only taken in `Drop`, so it is always present here.
        self.item
            .as_ref()
            .unwrap_or_else(|| unreachable!("claim item taken before drop"))
    }
}

impl<T> Drop for Claim<T> {
    fn drop(&mut self) {
        self.item.take();
        self.queue.release();
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Claim<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Claim").field(&self.item).finish()
    }
}

/// A single-pass iterator over one [`BridgingQueue`].
#[derive(Debug)]
pub struct ConsumptionSequence<T> {
    queue: Arc<BridgingQueue<T>>,
    finished: bool,
}

impl<T> ConsumptionSequence<T> {
    pub fn new(queue: Arc<BridgingQueue<T>>) -> Self {
        Self {
            queue,
            finished: false,
        }
    }

    /// Pulls once without waiting.
    pub fn step(&mut self) -> SequenceResult<Claim<T>> {
        if self.finished {
            return SequenceResult::Finished;
        }
        match self.queue.next() {
            NextResult::Ready(item) => SequenceResult::Success(Claim {
                item: Some(item),
                queue: Arc::clone(&self.queue),
            }),
            NextResult::Preparing => SequenceResult::Retry,
            NextResult::Finished => {
                self.finished = true;
                SequenceResult::Finished
            }
        }
    }

    /// Pulls the next item, waiting while another item is outstanding.
    ///
    /// Returns `None` once the queue is empty; the sequence is then finished.
    pub async fn next(&mut self) -> Option<Claim<T>> {
        loop {
            // Register interest before looking at the queue so a release that
            // happens between the check and the await is not missed.
            let queue = Arc::clone(&self.queue);
            let notified = queue.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.step() {
                SequenceResult::Success(claim) => return Some(claim),
                SequenceResult::Finished => return None,
                SequenceResult::Retry => notified.await,
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::bridging::ConsumedState;
    use tokio_test::{assert_pending, assert_ready, task};

    fn queue_with<T>(items: impl IntoIterator<Item = T>) -> Arc<BridgingQueue<T>> {
        let queue = Arc::new(BridgingQueue::new());
        queue.feed(items);
        queue
    }

    #[test]
    fn test_step_yields_items_in_order_and_then_finishes() {
        // Arrange
        let queue = queue_with(["a", "b"]);
        let mut seq = ConsumptionSequence::new(Arc::clone(&queue));

        // Act / Assert
        match seq.step() {
            SequenceResult::Success(claim) => assert_eq!(*claim, "a"),
            other => panic!("expected Success, got {other:?}"),
        }
        match seq.step() {
            SequenceResult::Success(claim) => assert_eq!(*claim, "b"),
            other => panic!("expected Success, got {other:?}"),
        }
        assert!(matches!(seq.step(), SequenceResult::Finished));
        assert!(seq.is_finished());
    }

    #[test]
    fn test_step_returns_retry_while_claim_is_held() {
        let queue = queue_with([1, 2]);
        let mut seq = ConsumptionSequence::new(Arc::clone(&queue));

        let held = match seq.step() {
            SequenceResult::Success(claim) => claim,
            other => panic!("expected Success, got {other:?}"),
        };
        assert!(matches!(seq.step(), SequenceResult::Retry));

        drop(held);
        assert!(matches!(seq.step(), SequenceResult::Success(ref c) if **c == 2));
    }

    #[test]
    fn test_dropping_claim_releases_marker() {
        let queue = queue_with([7]);
        let mut seq = ConsumptionSequence::new(Arc::clone(&queue));

        let claim = match seq.step() {
            SequenceResult::Success(claim) => claim,
            other => panic!("expected Success, got {other:?}"),
        };
        assert_eq!(queue.marker(), ConsumedState::Waiting);

        claim.release();
        assert_eq!(queue.marker(), ConsumedState::Consumed);
    }

    #[test]
    fn test_finished_sequence_is_not_restartable() {
        // Arrange: exhaust an empty queue.
        let queue: Arc<BridgingQueue<u8>> = Arc::new(BridgingQueue::new());
        let mut seq = ConsumptionSequence::new(Arc::clone(&queue));
        assert!(matches!(seq.step(), SequenceResult::Finished));

        // Act: feed after the sequence finished.
        queue.feed([1]);

        // Assert: this sequence stays finished; a fresh one sees the item.
        assert!(matches!(seq.step(), SequenceResult::Finished));
        let mut fresh = ConsumptionSequence::new(queue);
        assert!(matches!(fresh.step(), SequenceResult::Success(_)));
    }

    #[test]
    fn test_next_suspends_until_outstanding_claim_is_released() {
        // Arrange: the first consumer holds item 1.
        let queue = queue_with([1, 2]);
        let mut first = ConsumptionSequence::new(Arc::clone(&queue));
        let held = match first.step() {
            SequenceResult::Success(claim) => claim,
            other => panic!("expected Success, got {other:?}"),
        };

        let mut second = ConsumptionSequence::new(Arc::clone(&queue));
        let mut pending = task::spawn(second.next());

        // Act / Assert: no busy loop, the task is parked.
        assert_pending!(pending.poll());
        assert!(!pending.is_woken());

        drop(held);

        assert!(pending.is_woken());
        let claim = assert_ready!(pending.poll()).expect("item 2 must be delivered");
        assert_eq!(*claim, 2);
    }

    #[tokio::test]
    async fn test_next_returns_none_on_empty_queue() {
        let queue: Arc<BridgingQueue<u8>> = Arc::new(BridgingQueue::new());
        let mut seq = ConsumptionSequence::new(queue);
        assert!(seq.next().await.is_none());
        assert!(seq.is_finished());
    }
}
