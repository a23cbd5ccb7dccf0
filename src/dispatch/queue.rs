//! Request Queue
//!
//! Unbounded FIFO handing accepted connections from the acceptor to the
//! worker threads. Workers block in [`RequestQueue::pop`] until an item is
//! available or the queue is shut down.
//!
//! Shutdown is sticky. Items already queued are still handed out; once the
//! queue is both shut down and empty, `pop` returns `None` and the worker
//! exits.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

struct QueueState<T> {
    items: VecDeque<T>,
    shutdown: bool,
}

pub struct RequestQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
}

impl<T> RequestQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                shutdown: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    // A worker that panicked mid-exchange leaves the queue itself intact.
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `item` and wakes one waiter.
    ///
    /// Fails, returning the item, if the queue has been shut down.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.lock();
        if state.shutdown {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` only once the queue is shut down and drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.shutdown {
                return None;
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Non-blocking variant of [`pop`](Self::pop).
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Refuses further pushes and wakes every waiter.
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.not_empty.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
