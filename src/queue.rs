//! Lock-scoped FIFO queue for cross-thread handoff.
//!
//! Both directions of the host/reactor boundary (pending submissions and
//! completed transfers) move through a `LockedQueue`. Mutation is only
//! possible through the guard returned by [`LockedQueue::lock`], so the
//! "push and pop only while holding the lock" rule is enforced by the
//! borrow checker rather than by convention.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Thread-safe FIFO with explicit lock scoping.
pub struct LockedQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> LockedQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Acquire the queue lock. Released when the guard drops.
    pub fn lock(&self) -> QueueGuard<'_, T> {
        QueueGuard {
            inner: self.inner.lock().unwrap(),
        }
    }

    /// Advisory emptiness snapshot.
    ///
    /// Only answers "was the queue empty at some instant" - another thread
    /// may push or pop immediately after. Callers that are about to pop
    /// must re-check through the guard.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Number of queued items at some instant. Advisory, like `is_empty`.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

impl<T> Default for LockedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to the queue contents for the duration of the borrow.
pub struct QueueGuard<'a, T> {
    inner: MutexGuard<'a, VecDeque<T>>,
}

impl<T> QueueGuard<'_, T> {
    /// Append an item at the tail.
    pub fn push(&mut self, item: T) {
        self.inner.push_back(item);
    }

    /// Remove and return the head item, if any.
    pub fn pop(&mut self) -> Option<T> {
        self.inner.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Discard everything still queued.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
