//! Two-stack FIFO queue.
//!
//! # How does a queue built from two stacks work? (for beginners)
//!
//! A stack only lets you push and pop at one end, so on its own it gives you
//! last-in-first-out order.  Two stacks together give first-in-first-out:
//!
//! - New elements are pushed onto the **enqueue** stack.
//! - Elements are popped from the **dequeue** stack.
//! - When the dequeue stack runs dry, the whole enqueue stack is reversed into
//!   it.  The oldest element, which was at the bottom of the enqueue stack,
//!   ends up on top of the dequeue stack.
//!
//! Every element is moved between the stacks at most once, so push and pop are
//! amortized O(1).
//!
//! This type is not synchronised.  [`BridgingQueue`](super::BridgingQueue)
//! wraps it in a mutex before sharing it between tasks.

/// A FIFO queue backed by an enqueue stack and a dequeue stack.
#[derive(Debug, Clone)]
pub struct TwoStackQueue<T> {
    enqueue_stack: Vec<T>,
    dequeue_stack: Vec<T>,
}

impl<T> TwoStackQueue<T> {
    pub fn new() -> Self {
        Self {
            enqueue_stack: Vec::new(),
            dequeue_stack: Vec::new(),
        }
    }

    /// Appends `elements` to the back of the queue, preserving their order.
    pub fn enqueue<I>(&mut self, elements: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.enqueue_stack.extend(elements);
    }

    /// Appends a single element to the back of the queue.
    pub fn push(&mut self, element: T) {
        self.enqueue_stack.push(element);
    }

    /// Removes and returns the oldest element.
    pub fn dequeue(&mut self) -> Option<T> {
        if self.dequeue_stack.is_empty() {
            self.rebalance();
        }
        self.dequeue_stack.pop()
    }

    /// Returns the oldest element without removing it.
    pub fn peek(&self) -> Option<&T> {
        // The oldest element is either on top of the dequeue stack or, if that
        // stack is empty, at the bottom of the enqueue stack.
        self.dequeue_stack
            .last()
            .or_else(|| self.enqueue_stack.first())
    }

    pub fn len(&self) -> usize {
        self.enqueue_stack.len() + self.dequeue_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enqueue_stack.is_empty() && self.dequeue_stack.is_empty()
    }

    fn rebalance(&mut self) {
        // Invariant: only called when the dequeue stack is empty, otherwise
        // newer elements would end up above older ones.
        debug_assert!(self.dequeue_stack.is_empty());
        self.dequeue_stack.extend(self.enqueue_stack.drain(..).rev());
    }
}

impl<T> Default for TwoStackQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
