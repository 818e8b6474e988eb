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

//! State shared between the manager's callers and its loader thread.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::Sender;
use tessera_core::{CacheKey, ResourceError, ResourceResult};
use tessera_data::{Acquire, CachedResource, ResourceCache, Resolution};
use tessera_io::FileClock;

use super::events::ResourceEvent;
use super::loader::{LoadCallback, LoadTask, LoaderThread};
use super::metrics::ResourceMetrics;

/// Builds an unloaded, type-erased instance for a path.
pub(crate) type Constructor = fn(&str) -> CachedResource;

pub(crate) struct SharedState {
    pub(crate) cache: ResourceCache,
    pub(crate) clock: Arc<dyn FileClock>,
    pub(crate) metrics: Option<ResourceMetrics>,
    pub(crate) events: Option<Sender<ResourceEvent>>,
    /// `Some` while asynchronous loading is enabled.
    pub(crate) loader: Mutex<Option<LoaderThread>>,
}

impl SharedState {
    pub(crate) fn new(clock: Arc<dyn FileClock>, metrics: Option<ResourceMetrics>) -> Self {
        Self {
            cache: ResourceCache::new(),
            clock,
            metrics,
            events: None,
            loader: Mutex::new(None),
        }
    }

    pub(crate) fn lock_loader(&self) -> MutexGuard<'_, Option<LoaderThread>> {
        self.loader.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_async(&self) -> bool {
        self.lock_loader().is_some()
    }

    /// Hands a task to the loader thread, or completes it on the calling thread
    /// when asynchronous loading was turned off in the meantime.
    pub(crate) fn dispatch(&self, task: LoadTask) {
        let rejected = match self.lock_loader().as_ref() {
            Some(loader) => loader.submit(task).err(),
            None => Some(task),
        };
        if let Some(task) = rejected {
            log::debug!("Loader not running, loading '{}' inline", task.key);
            self.complete(task);
        }
    }

    /// Runs the `load()` hook of `resource`, containing panics.
    pub(crate) fn run_load(&self, resource: &CachedResource) -> ResourceResult<()> {
        let outcome = {
            let _timer = self.metrics.as_ref().map(ResourceMetrics::time_load);
            panic::catch_unwind(AssertUnwindSafe(|| resource.load()))
        };
        let path = resource.base().path();
        let result = match outcome {
            Ok(true) => Ok(()),
            Ok(false) => Err(ResourceError::LoadFailed {
                path: path.to_string(),
            }),
            Err(payload) => Err(ResourceError::from_panic(path, "load", &*payload)),
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_load(result.is_ok());
        }
        result
    }

    /// Finalizes an asynchronous load: runs `load()`, records the file time
    /// or evicts the failed entry, releases the key for hot reload polling,
    /// then invokes the callback.
    pub(crate) fn complete(&self, task: LoadTask) {
        let LoadTask {
            key,
            resource,
            callback,
        } = task;

        match self.run_load(&resource) {
            Ok(()) => {
                if self.is_cached(&key, &resource) {
                    self.record_file_time(&key);
                }
                self.cache.finish_loading(&key);
                log::debug!("Loaded '{key}' in the background");
                self.emit(ResourceEvent::Loaded { key });
            }
            Err(err) => {
                log_failure(&err);
                if self.cache.evict_if_same(&key, &resource) {
                    self.refresh_cached_gauge();
                }
                self.cache.finish_loading(&key);
                self.emit(ResourceEvent::LoadFailed {
                    key,
                    reason: err.to_string(),
                });
            }
        }

        if let Some(callback) = callback {
            self.invoke(callback, resource);
        }
    }

    /// Acquires `key` for an asynchronous request without ever blocking.
    pub(crate) fn load_async(
        self: &Arc<Self>,
        key: CacheKey,
        construct: Constructor,
        callback: LoadCallback,
    ) {
        match self.cache.acquire(&key) {
            Acquire::Hit(resource) => self.invoke(callback, resource),
            Acquire::InFlight(pending) => {
                let shared = Arc::clone(self);
                pending.on_resolved(move |resolution| match resolution {
                    Resolution::Published => shared.load_async(key, construct, callback),
                    Resolution::Failed(failed) => {
                        let resource = failed.unwrap_or_else(|| construct(&key.path));
                        shared.invoke(callback, resource);
                    }
                });
            }
            Acquire::Claimed(claim) => {
                let resource = construct(&key.path);
                resource.base().add_ref();
                claim.publish_for_loading(Arc::clone(&resource));
                self.refresh_cached_gauge();
                self.dispatch(LoadTask::new(key, resource, Some(callback)));
            }
        }
    }

    pub(crate) fn invoke(&self, callback: LoadCallback, resource: CachedResource) {
        let path = resource.base().path().to_string();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(resource))) {
            let message = ResourceError::from_panic(path, "callback", &*payload);
            log::error!("{message}");
        }
    }

    /// Runs the `unload()` hook of a resource that left the cache.
    pub(crate) fn unload_resource(&self, resource: &CachedResource) {
        let key = key_of(resource);
        match panic::catch_unwind(AssertUnwindSafe(|| resource.unload())) {
            Ok(()) => log::debug!("Unloaded '{key}'"),
            Err(payload) => {
                log_failure(&ResourceError::from_panic(&key.path, "unload", &*payload));
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_unload();
        }
        self.emit(ResourceEvent::Unloaded { key });
    }

    /// Runs the `on_reload()` hook of a resource whose file changed.
    pub(crate) fn reload_resource(&self, resource: &CachedResource) -> bool {
        let key = key_of(resource);
        let success = match panic::catch_unwind(AssertUnwindSafe(|| resource.on_reload())) {
            Ok(true) => {
                log::info!("Reloaded '{key}'");
                true
            }
            Ok(false) => {
                log::warn!("Reload of '{key}' failed");
                false
            }
            Err(payload) => {
                log_failure(&ResourceError::from_panic(&key.path, "on_reload", &*payload));
                false
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_reload(success);
        }
        self.emit(ResourceEvent::Reloaded { key, success });
        success
    }

    /// Remembers the current write time of a file-backed key.
    pub(crate) fn record_file_time(&self, key: &CacheKey) {
        if key.is_virtual() {
            return;
        }
        match self.clock.modified(Path::new(&key.path)) {
            Ok(Some(time)) => self.cache.record_file_time(&key.path, time),
            Ok(None) => log::trace!("'{}' has no backing file", key.path),
            Err(source) => {
                let err = ResourceError::Io {
                    path: key.path.clone(),
                    source,
                };
                log::warn!("{err}");
            }
        }
    }

    fn is_cached(&self, key: &CacheKey, resource: &CachedResource) -> bool {
        self.cache
            .get(key)
            .is_some_and(|cached| Arc::ptr_eq(&cached, resource))
    }

    pub(crate) fn refresh_cached_gauge(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_cached(self.cache.len());
        }
    }

    pub(crate) fn emit(&self, event: ResourceEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.try_send(event);
        }
    }
}

pub(crate) fn key_of(resource: &CachedResource) -> CacheKey {
    CacheKey::new(resource.type_tag(), resource.base().path())
}

fn log_failure(err: &ResourceError) {
    match err {
        ResourceError::Panicked { .. } => log::error!("{err}"),
        _ => log::warn!("{err}"),
    }
}
