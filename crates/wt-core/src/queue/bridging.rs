//! The bridging queue between transport delivery and message consumption.
//!
//! The transport side calls [`BridgingQueue::feed`] from its reader task as
//! messages arrive.  The consumer side pulls them out one at a time with
//! [`BridgingQueue::next`], usually through a
//! [`ConsumptionSequence`](super::ConsumptionSequence).
//!
//! # Single-flight marker
//!
//! Each queue owns a marker that is either [`ConsumedState::Consumed`] (the
//! next pop may proceed) or [`ConsumedState::Waiting`] (an item has been
//! handed out and is still being processed).  While the marker reads
//! `Waiting`, `next()` answers [`NextResult::Preparing`] and leaves the queue
//! untouched.  Whoever received the item calls [`BridgingQueue::release`]
//! once processing is done.
//!
//! The marker belongs to the queue instance.  Two connections never share a
//! marker, so a slow consumer on one connection cannot stall another.
//!
//! # Locking
//!
//! The two stacks and the marker sit behind one `std::sync::Mutex`.  The lock
//! is only held for a push or a pop, never across an `.await`, so a blocking
//! mutex is the right tool here.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use super::stack::TwoStackQueue;

/// State of the single-flight marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumedState {
    /// No item is outstanding; `next()` may pop.
    Consumed,
    /// An item was handed out and has not been released yet.
    Waiting,
}

/// Result of one [`BridgingQueue::next`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum NextResult<T> {
    /// The oldest item; the marker now reads `Waiting`.
    Ready(T),
    /// Another item is still outstanding; try again after it is released.
    Preparing,
    /// The queue is empty.
    Finished,
}

struct Inner<T> {
    stack: TwoStackQueue<T>,
    marker: ConsumedState,
}

/// Thread-safe FIFO with a single-flight marker.
pub struct BridgingQueue<T> {
    inner: Mutex<Inner<T>>,
    wake: Notify,
}

impl<T> BridgingQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                stack: TwoStackQueue::new(),
                marker: ConsumedState::Consumed,
            }),
            wake: Notify::new(),
        }
    }

    /// Appends `units` to the back of the queue in order.
    ///
    /// Never waits for the consumer.  Safe to call from any task while another
    /// task is calling [`next`](Self::next).
    pub fn feed<I>(&self, units: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.lock().stack.enqueue(units);
        self.wake.notify_waiters();
    }

    /// Pops the oldest item if no other item is outstanding.
    ///
    /// See the module docs for the meaning of each [`NextResult`].
    pub fn next(&self) -> NextResult<T> {
        let mut inner = self.lock();
        if inner.marker == ConsumedState::Waiting {
            return NextResult::Preparing;
        }
        match inner.stack.dequeue() {
            Some(unit) => {
                inner.marker = ConsumedState::Waiting;
                NextResult::Ready(unit)
            }
            None => NextResult::Finished,
        }
    }

    /// Marks the outstanding item as fully processed and wakes any consumer
    /// waiting for its turn.
    pub fn release(&self) {
        self.lock().marker = ConsumedState::Consumed;
        self.wake.notify_waiters();
    }

    pub fn marker(&self) -> ConsumedState {
        self.lock().marker
    }

    pub fn len(&self) -> usize {
        self.lock().stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().stack.is_empty()
    }

    /// Returns a clone of the oldest item without removing it.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.lock().stack.peek().cloned()
    }

    /// A future that completes on the next `feed` or `release`.
    pub(crate) fn notified(&self) -> Notified<'_> {
        self.wake.notified()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // A panic while holding the lock cannot leave the stacks half-updated
        // (every mutation is a single Vec call), so a poisoned lock is still
        // safe to use.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for BridgingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for BridgingQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("BridgingQueue")
            .field("len", &inner.stack.len())
            .field("marker", &inner.marker)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_next_on_empty_queue_is_finished() {
        let queue: BridgingQueue<u8> = BridgingQueue::new();
        assert_eq!(queue.next(), NextResult::Finished);
        assert_eq!(queue.marker(), ConsumedState::Consumed);
    }

    #[test]
    fn test_next_flips_marker_to_waiting() {
        // Arrange
        let queue = BridgingQueue::new();
        queue.feed([10]);

        // Act
        let result = queue.next();

        // Assert
        assert_eq!(result, NextResult::Ready(10));
        assert_eq!(queue.marker(), ConsumedState::Waiting);
    }

    #[test]
    fn test_next_reports_preparing_until_released() {
        // Arrange: one item outstanding, one still queued.
        let queue = BridgingQueue::new();
        queue.feed([1, 2]);
        assert_eq!(queue.next(), NextResult::Ready(1));

        // Act / Assert: repeated calls neither skip nor duplicate item 2.
        assert_eq!(queue.next(), NextResult::Preparing);
        assert_eq!(queue.next(), NextResult::Preparing);
        assert_eq!(queue.len(), 1);

        queue.release();
        assert_eq!(queue.next(), NextResult::Ready(2));
    }

    #[test]
    fn test_finished_does_not_take_the_marker() {
        // An empty pop must not leave the queue stuck in `Waiting`, or the
        // next feed could never be consumed.
        let queue = BridgingQueue::new();
        assert_eq!(queue.next(), NextResult::Finished);

        queue.feed(["late"]);

        assert_eq!(queue.next(), NextResult::Ready("late"));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let queue = BridgingQueue::new();
        queue.feed(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(queue.peek().as_deref(), Some("a"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_concurrent_feed_and_next_preserve_every_item_in_order() {
        // Arrange
        let queue = Arc::new(BridgingQueue::new());
        let producer_queue = Arc::clone(&queue);
        let total = 10_000u32;

        // Act: feed from one thread while draining from another.
        let producer = thread::spawn(move || {
            for batch in (0..total).collect::<Vec<_>>().chunks(7) {
                producer_queue.feed(batch.iter().copied());
            }
        });

        let mut received = Vec::with_capacity(total as usize);
        while received.len() < total as usize {
            match queue.next() {
                NextResult::Ready(n) => {
                    received.push(n);
                    queue.release();
                }
                NextResult::Preparing => panic!("marker must be released by this consumer"),
                NextResult::Finished => thread::yield_now(),
            }
        }
        producer.join().expect("producer panicked");

        // Assert
        assert_eq!(received, (0..total).collect::<Vec<_>>());
        assert_eq!(queue.next(), NextResult::Finished);
    }

    #[test]
    fn test_markers_are_independent_per_queue() {
        let a = BridgingQueue::new();
        let b = BridgingQueue::new();
        a.feed([1]);
        b.feed([2]);

        assert_eq!(a.next(), NextResult::Ready(1));
        // `a` holding its marker has no effect on `b`.
        assert_eq!(b.next(), NextResult::Ready(2));
    }
}
