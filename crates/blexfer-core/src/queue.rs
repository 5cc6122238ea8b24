//! Bounded notification queue shared by transport adapters
//!
//! A [`PeripheralTransport::send`](crate::PeripheralTransport::send) call is a
//! synchronous `push`; the radio side drains the queue asynchronously. When a
//! push was refused for lack of room, the next `pop` that frees a slot tells
//! the caller to raise `ReadyToSendMore`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct QueueState {
    values: VecDeque<Vec<u8>>,
    starved: bool,
    closed: bool,
}

/// Bounded FIFO of notification values with readiness tracking
#[derive(Debug)]
pub struct NotifyQueue {
    state: Mutex<QueueState>,
    wakeup: Notify,
    capacity: usize,
}

impl NotifyQueue {
    /// Create a queue holding at most `capacity` values (minimum one)
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            wakeup: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a value; `false` when the queue is full or closed
    pub fn push(&self, value: Vec<u8>) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        if state.values.len() >= self.capacity {
            state.starved = true;
            return false;
        }
        state.values.push_back(value);
        drop(state);
        self.wakeup.notify_one();
        true
    }

    /// Wait for the next value
    ///
    /// Returns the value and whether a refused producer should now be told
    /// it may send again. `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<(Vec<u8>, bool)> {
        loop {
            {
                let mut state = self.lock();
                if let Some(value) = state.values.pop_front() {
                    let ready = state.starved;
                    state.starved = false;
                    return Some((value, ready));
                }
                if state.closed {
                    return None;
                }
            }
            self.wakeup.notified().await;
        }
    }

    /// Drop queued values, e.g. when the subscriber goes away
    pub fn clear(&self) {
        let mut state = self.lock();
        state.values.clear();
        state.starved = false;
    }

    /// Refuse further pushes and wake the consumer
    pub fn close(&self) {
        self.lock().closed = true;
        self.wakeup.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
