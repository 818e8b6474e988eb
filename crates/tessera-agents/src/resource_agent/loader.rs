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

//! The background loader thread and the tasks it executes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tessera_core::{CacheKey, ResourceError, ResourceResult};
use tessera_data::CachedResource;
use tessera_io::TaskQueue;

use super::shared::SharedState;

/// Completion callback of an asynchronous load, already type-erased.
pub(crate) type LoadCallback = Box<dyn FnOnce(CachedResource) + Send>;

/// One pending asynchronous load.
///
/// The resource is already in the cache, unloaded, when the task is queued.
pub(crate) struct LoadTask {
    pub(crate) key: CacheKey,
    pub(crate) resource: CachedResource,
    pub(crate) callback: Option<LoadCallback>,
}

impl LoadTask {
    pub(crate) fn new(key: CacheKey, resource: CachedResource, callback: Option<LoadCallback>) -> Self {
        Self {
            key,
            resource,
            callback,
        }
    }
}

/// Owns the loader thread and the queue feeding it.
///
/// Each instance runs exactly one thread over its own queue. Stopping it shuts
/// the queue down for good; enabling asynchronous loading again spawns a new
/// instance.
pub(crate) struct LoaderThread {
    queue: Arc<TaskQueue<LoadTask>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LoaderThread {
    /// Starts a loader thread named `name` that completes tasks against `shared`.
    pub(crate) fn spawn(name: &str, shared: Arc<SharedState>) -> ResourceResult<Self> {
        let queue = Arc::new(TaskQueue::new());
        let running = Arc::new(AtomicBool::new(true));

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn({
                let queue = Arc::clone(&queue);
                let running = Arc::clone(&running);
                move || run(&queue, &running, &shared)
            })
            .map_err(|source| ResourceError::LoaderSpawn {
                name: name.to_string(),
                source,
            })?;

        Ok(Self {
            queue,
            running,
            handle: Some(handle),
        })
    }

    /// Queues a task, handing it back if the loader is stopping.
    pub(crate) fn submit(&self, task: LoadTask) -> Result<(), LoadTask> {
        self.queue.push(task)
    }

    /// Returns the number of tasks waiting to be picked up.
    pub(crate) fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Stops the thread and waits for the task in progress, if any, to finish.
    ///
    /// Returns the tasks that were still queued; they were never started.
    pub(crate) fn stop(mut self) -> Vec<LoadTask> {
        self.halt()
    }

    fn halt(&mut self) -> Vec<LoadTask> {
        self.running.store(false, Ordering::SeqCst);
        let leftover = self.queue.shutdown();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Stopped from one of its own callbacks; it exits after the callback returns.
                log::warn!("Loader thread asked to stop itself; not joining");
            } else if handle.join().is_err() {
                log::error!("Loader thread terminated with a panic");
            }
        }
        leftover
    }
}

impl Drop for LoaderThread {
    fn drop(&mut self) {
        let leftover = self.halt();
        if !leftover.is_empty() {
            log::warn!("Dropped {} queued load task(s)", leftover.len());
        }
    }
}

/// Waits for tasks and completes them until the queue is shut down. A task
/// that was already dequeued always runs to completion.
fn run(queue: &TaskQueue<LoadTask>, running: &AtomicBool, shared: &SharedState) {
    log::info!("Resource loader thread started.");

    while running.load(Ordering::SeqCst) {
        match queue.wait_and_pop() {
            Some(task) => shared.complete(task),
            None => break,
        }
    }

    log::info!("Resource loader thread stopped.");
}
