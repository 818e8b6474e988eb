// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A blocking, unbounded FIFO queue with an explicit shutdown signal.
//!
//! The shutdown flag lives under the same mutex as the items and is part of
//! the wait predicate, so a shutdown can never slip between a waiter's check
//! and its sleep.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    shut_down: bool,
}

/// A thread-safe FIFO queue carrying work from producers to consumers.
///
/// `push` never blocks. `wait_and_pop` blocks until an item is available or
/// the queue is shut down. After [`shutdown`](TaskQueue::shutdown), every
/// `wait_and_pop` returns `None` immediately, and items still queued are
/// never handed out.
#[derive(Debug)]
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> TaskQueue<T> {
    /// Creates an empty, running queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                shut_down: false,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an item and wakes one waiter.
    ///
    /// Hands the item back if the queue is already shut down.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.lock();
        if state.shut_down {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Blocks until an item is available and returns it.
    ///
    /// Returns `None` once the queue is shut down.
    pub fn wait_and_pop(&self) -> Option<T> {
        let mut state = self
            .available
            .wait_while(self.lock(), |state| {
                state.items.is_empty() && !state.shut_down
            })
            .unwrap_or_else(PoisonError::into_inner);
        if state.shut_down {
            return None;
        }
        state.items.pop_front()
    }

    /// Signals shutdown and wakes every waiter. Idempotent.
    ///
    /// Returns the items that were still queued so the caller can account for
    /// them; they will never be handed out by this queue.
    pub fn shutdown(&self) -> Vec<T> {
        let mut state = self.lock();
        state.shut_down = true;
        let dropped: Vec<T> = state.items.drain(..).collect();
        drop(state);
        if !dropped.is_empty() {
            log::trace!("Task queue shut down with {} item(s) pending", dropped.len());
        }
        self.available.notify_all();
        dropped
    }

    /// Returns the number of queued items.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Returns `true` if no items are queued.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
