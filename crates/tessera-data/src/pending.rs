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

//! A one-shot promise for a resource that is being created.
//!
//! The first thread to miss on a key claims it and creates the resource;
//! every other thread that misses on the same key finds the [`PendingLoad`]
//! and either blocks on it or registers a continuation, instead of
//! constructing a second instance.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tessera_core::CacheKey;

use crate::cache::CachedResource;

/// How a pending creation ended.
#[derive(Clone)]
pub enum Resolution {
    /// The instance was inserted into the cache; look it up again.
    Published,
    /// Creation failed. Carries the failed, never-cached instance if one was
    /// constructed.
    Failed(Option<CachedResource>),
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Published => f.write_str("Published"),
            Resolution::Failed(Some(resource)) => {
                write!(f, "Failed({:?})", resource.base().path())
            }
            Resolution::Failed(None) => f.write_str("Failed(None)"),
        }
    }
}

type Continuation = Box<dyn FnOnce(Resolution) + Send>;

enum PendingState {
    Waiting(Vec<Continuation>),
    Resolved(Resolution),
}

/// The in-flight creation record for one cache key.
pub struct PendingLoad {
    key: CacheKey,
    state: Mutex<PendingState>,
    resolved: Condvar,
}

impl PendingLoad {
    pub(crate) fn new(key: CacheKey) -> Self {
        Self {
            key,
            state: Mutex::new(PendingState::Waiting(Vec::new())),
            resolved: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the key being created.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Returns `true` once the creation has finished.
    pub fn is_resolved(&self) -> bool {
        matches!(*self.lock(), PendingState::Resolved(_))
    }

    /// Blocks until the creation finishes.
    pub fn wait(&self) -> Resolution {
        let state = self
            .resolved
            .wait_while(self.lock(), |state| {
                matches!(state, PendingState::Waiting(_))
            })
            .unwrap_or_else(PoisonError::into_inner);
        match &*state {
            PendingState::Resolved(resolution) => resolution.clone(),
            PendingState::Waiting(_) => unreachable!("woken before resolution"),
        }
    }

    /// Runs `continuation` once the creation finishes.
    ///
    /// If it already finished, the continuation runs immediately on the
    /// calling thread; otherwise it runs on the thread that resolves it.
    pub fn on_resolved(&self, continuation: impl FnOnce(Resolution) + Send + 'static) {
        let resolution = {
            let mut state = self.lock();
            match &mut *state {
                PendingState::Waiting(continuations) => {
                    continuations.push(Box::new(continuation));
                    return;
                }
                PendingState::Resolved(resolution) => resolution.clone(),
            }
        };
        continuation(resolution);
    }

    /// Resolves the creation, waking blocked waiters and running continuations
    /// outside the lock. Resolving twice is ignored.
    pub(crate) fn resolve(&self, resolution: Resolution) {
        let mut state = self.lock();
        let continuations = match &mut *state {
            PendingState::Waiting(continuations) => std::mem::take(continuations),
            PendingState::Resolved(_) => {
                log::warn!("Pending load for '{}' resolved twice", self.key);
                return;
            }
        };
        *state = PendingState::Resolved(resolution.clone());
        drop(state);

        self.resolved.notify_all();
        for continuation in continuations {
            continuation(resolution.clone());
        }
    }
}

impl fmt::Debug for PendingLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLoad")
            .field("key", &self.key)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tessera_core::TypeTag;

    fn pending() -> Arc<PendingLoad> {
        Arc::new(PendingLoad::new(CacheKey::new(TypeTag::new("t"), "p")))
    }

    #[test]
    fn waiters_see_the_resolution() {
        let pending = pending();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let pending = Arc::clone(&pending);
                thread::spawn(move || pending.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        assert!(!pending.is_resolved());
        pending.resolve(Resolution::Published);

        for waiter in waiters {
            assert!(matches!(waiter.join().unwrap(), Resolution::Published));
        }
    }

    #[test]
    fn continuations_run_once_before_and_after_resolution() {
        let pending = pending();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        pending.on_resolved(move |resolution| {
            assert!(matches!(resolution, Resolution::Published));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        pending.resolve(Resolution::Published);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&runs);
        pending.on_resolved(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        pending.resolve(Resolution::Failed(None));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(matches!(pending.wait(), Resolution::Published));
    }
}
