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

//! The ResourceManager is the public entry point of the resource subsystem.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::Sender;
use tessera_core::{
    virtual_path, CacheKey, Resource, ResourceError, ResourceHandle, ResourceManagerConfig,
    ResourceResult,
};
use tessera_data::{Acquire, CacheStats, CachedResource, Release, Resolution};
use tessera_io::{FileClock, OsFileClock};
use tessera_telemetry::MetricsRegistry;

use super::events::ResourceEvent;
use super::loader::{LoadCallback, LoadTask, LoaderThread};
use super::metrics::ResourceMetrics;
use super::shared::SharedState;

/// Caches resources by `(type, path)`, loads them synchronously or on a
/// background thread, and reloads them when their files change.
///
/// The manager is an ordinary value: construct one at startup and share it
/// (usually behind an `Arc`) with the subsystems that need it. Every method
/// takes `&self` and may be called from any thread.
///
/// Load failures are reported through resource state, not errors: callers
/// must check [`Resource::is_loaded`] before using what they get back.
pub struct ResourceManager {
    config: ResourceManagerConfig,
    shared: Arc<SharedState>,
    registry: MetricsRegistry,
    initialized: AtomicBool,
    hot_reload_enabled: AtomicBool,
    /// Time accumulated by `update()` since the last poll.
    since_last_poll: Mutex<Duration>,
}

impl ResourceManager {
    /// Creates a manager with a private metrics registry.
    ///
    /// No thread is started until [`initialize`](Self::initialize) or
    /// [`set_async_loading`](Self::set_async_loading) is called.
    pub fn new(config: ResourceManagerConfig) -> Self {
        Self::with_metrics(config, MetricsRegistry::new())
    }

    /// Creates a manager that reports into `registry`.
    pub fn with_metrics(config: ResourceManagerConfig, registry: MetricsRegistry) -> Self {
        let metrics = match ResourceMetrics::register(&registry) {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                log::warn!("Resource metrics disabled: {e}");
                None
            }
        };
        let shared = SharedState::new(Arc::new(OsFileClock), metrics);
        Self {
            hot_reload_enabled: AtomicBool::new(config.hot_reload.enabled),
            config,
            shared: Arc::new(shared),
            registry,
            initialized: AtomicBool::new(false),
            since_last_poll: Mutex::new(Duration::ZERO),
        }
    }

    /// Replaces the filesystem used for modification times.
    ///
    /// Must be called before the loader thread is started.
    pub fn with_file_clock(mut self, clock: Arc<dyn FileClock>) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.clock = clock,
            None => log::warn!("File clock replaced after the loader started; ignored"),
        }
        self
    }

    /// Attaches a channel that receives a [`ResourceEvent`] for every load,
    /// failure, reload and unload.
    ///
    /// Must be called before the loader thread is started. Events are dropped
    /// when the channel is full or disconnected.
    pub fn with_event_sender(mut self, sender: Sender<ResourceEvent>) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.events = Some(sender),
            None => log::warn!("Event sender attached after the loader started; ignored"),
        }
        self
    }

    /// Brings the manager up, starting the loader thread if the configuration
    /// asks for asynchronous loading.
    pub fn initialize(&self) -> ResourceResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            log::debug!("ResourceManager already initialized");
            return Ok(());
        }
        log::info!("Initializing ResourceManager");
        if self.config.async_loading {
            if let Err(e) = self.set_async_loading(true) {
                self.initialized.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stops the loader thread and unloads every cached resource once.
    ///
    /// The task being loaded when this is called finishes first; tasks still
    /// queued are dropped. Safe to call more than once; also runs on drop.
    pub fn shutdown(&self) {
        let was_initialized = self.initialized.swap(false, Ordering::SeqCst);
        let loader = self.shared.lock_loader().take();
        if !was_initialized && loader.is_none() && self.shared.cache.is_empty() {
            return;
        }
        log::info!("Shutting down ResourceManager");

        if let Some(loader) = loader {
            let dropped = loader.stop();
            if !dropped.is_empty() {
                log::warn!("Dropped {} queued load task(s) at shutdown", dropped.len());
            }
        }
        for resource in self.shared.cache.drain() {
            self.shared.unload_resource(&resource);
        }
        self.shared.refresh_cached_gauge();
    }

    /// Enables or disables asynchronous loading.
    ///
    /// Enabling starts a fresh loader thread; disabling stops it and completes
    /// the tasks it had not started yet on the calling thread.
    pub fn set_async_loading(&self, enabled: bool) -> ResourceResult<()> {
        if enabled {
            let mut loader = self.shared.lock_loader();
            if loader.is_none() {
                let thread =
                    LoaderThread::spawn(&self.config.loader_thread_name, Arc::clone(&self.shared))?;
                *loader = Some(thread);
                log::info!("Asynchronous loading enabled");
            }
        } else {
            let loader = self.shared.lock_loader().take();
            if let Some(loader) = loader {
                let leftover = loader.stop();
                log::info!(
                    "Asynchronous loading disabled, finishing {} queued task(s) inline",
                    leftover.len()
                );
                for task in leftover {
                    self.shared.complete(task);
                }
            }
        }
        Ok(())
    }

    /// Loads a resource, returning `None` if it could not be loaded.
    ///
    /// See [`try_load`](Self::try_load).
    pub fn load<T: Resource>(&self, path: &str) -> Option<ResourceHandle<T>> {
        self.try_load(path).ok()
    }

    /// Returns the resource cached under `path`, creating it on a miss.
    ///
    /// A hit takes one more logical reference. On a miss the new instance
    /// starts with one reference and:
    /// - with asynchronous loading disabled, is loaded before returning and
    ///   only cached if that succeeded;
    /// - with asynchronous loading enabled, is cached unloaded and queued for
    ///   the loader thread.
    ///
    /// Concurrent misses on the same key construct a single instance; the
    /// other callers wait for it.
    pub fn try_load<T: Resource>(&self, path: &str) -> ResourceResult<ResourceHandle<T>> {
        let key = CacheKey::of::<T>(path);
        loop {
            match self.shared.cache.acquire(&key) {
                Acquire::Hit(entry) => {
                    let handle = typed::<T>(Arc::clone(&entry), &key);
                    if handle.is_err() {
                        entry.base().release_ref();
                    }
                    return handle;
                }
                Acquire::InFlight(pending) => {
                    if let Resolution::Failed(_) = pending.wait() {
                        return Err(ResourceError::LoadFailed { path: key.path });
                    }
                }
                Acquire::Claimed(claim) => {
                    let resource = ResourceHandle::new(T::new(&key.path));
                    resource.add_ref();
                    let erased = resource.erased();

                    if self.shared.is_async() {
                        claim.publish_for_loading(Arc::clone(&erased));
                        self.shared.refresh_cached_gauge();
                        self.shared.dispatch(LoadTask::new(key, erased, None));
                        return Ok(resource);
                    }

                    return match self.shared.run_load(&erased) {
                        Ok(()) => {
                            self.shared.record_file_time(&key);
                            claim.publish(erased);
                            self.shared.refresh_cached_gauge();
                            log::debug!("Loaded '{key}'");
                            self.shared.emit(ResourceEvent::Loaded { key });
                            Ok(resource)
                        }
                        Err(err) => {
                            claim.abandon(Some(erased));
                            log::warn!("{err}");
                            self.shared.emit(ResourceEvent::LoadFailed {
                                key,
                                reason: err.to_string(),
                            });
                            Err(err)
                        }
                    };
                }
            }
        }
    }

    /// Requests a resource without blocking and hands it to `callback`.
    ///
    /// On a hit the callback runs immediately on the calling thread, with one
    /// more logical reference taken. On a miss the instance is cached unloaded
    /// and the callback runs once loading finishes, on the loader thread (or
    /// inline if asynchronous loading is disabled). If loading fails the
    /// callback still runs, with an unloaded instance, and the entry is
    /// evicted so a later request starts over.
    pub fn load_async<T, F>(&self, path: &str, callback: F)
    where
        T: Resource,
        F: FnOnce(ResourceHandle<T>) + Send + 'static,
    {
        let erased_callback: LoadCallback = Box::new(move |resource: CachedResource| {
            match ResourceHandle::<T>::from_erased(Arc::clone(&resource)) {
                Some(handle) => callback(handle),
                None => {
                    resource.base().release_ref();
                    log::error!(
                        "Resource '{}' is cached under tag '{}' as {}, not {}",
                        resource.base().path(),
                        T::TYPE_TAG,
                        resource.type_name(),
                        std::any::type_name::<T>()
                    );
                }
            }
        });
        self.shared
            .load_async(CacheKey::of::<T>(path), construct::<T>, erased_callback);
    }

    /// Releases one logical reference on the resource cached under `path`.
    ///
    /// When none remain the entry is removed and the resource's `unload()` runs,
    /// outside the cache lock. Unloading an absent path does nothing.
    pub fn unload<T: Resource>(&self, path: &str) {
        let key = CacheKey::of::<T>(path);
        match self.shared.cache.release(&key) {
            Release::Removed(resource) => {
                self.shared.refresh_cached_gauge();
                self.shared.unload_resource(&resource);
            }
            Release::Retained(remaining) => {
                log::debug!("Released '{key}', {remaining} reference(s) left");
            }
            Release::Absent => log::debug!("Unload of '{key}' ignored, not cached"),
        }
    }

    /// Returns the resource cached under `path` without loading it or taking
    /// a reference.
    pub fn get_resource<T: Resource>(&self, path: &str) -> Option<ResourceHandle<T>> {
        let key = CacheKey::of::<T>(path);
        let entry = self.shared.cache.get(&key)?;
        typed(entry, &key).ok()
    }

    /// Creates, or returns the existing, virtual resource `memory://<name>`.
    ///
    /// The instance is not loaded: populate it through its own API. Repeated
    /// calls with the same name return the same instance and leave its
    /// reference count alone. Virtual resources are never hot reloaded.
    ///
    /// Returns `None` only if another type is cached under the same tag.
    pub fn create_resource<T: Resource>(&self, name: &str) -> Option<ResourceHandle<T>> {
        let key = CacheKey::of::<T>(virtual_path(name));
        loop {
            match self.shared.cache.acquire_untracked(&key) {
                Acquire::Hit(entry) => return typed(entry, &key).ok(),
                Acquire::InFlight(pending) => {
                    pending.wait();
                }
                Acquire::Claimed(claim) => {
                    let resource = ResourceHandle::new(T::new(&key.path));
                    resource.add_ref();
                    claim.publish(resource.erased());
                    self.shared.refresh_cached_gauge();
                    log::debug!("Created '{key}'");
                    return Some(resource);
                }
            }
        }
    }

    /// Reloads every loaded, file-backed resource whose file was written
    /// since it was last seen.
    ///
    /// Entries whose file is missing or cannot be queried are skipped and stay
    /// cached. Returns the number of resources reloaded successfully.
    pub fn reload_modified(&self) -> usize {
        let clock = &self.shared.clock;
        let modified = self
            .shared
            .cache
            .collect_modified(|path| clock.modified(path));
        if !modified.is_empty() {
            log::debug!("{} resource(s) modified on disk", modified.len());
        }
        modified
            .iter()
            .filter(|resource| self.shared.reload_resource(resource))
            .count()
    }

    /// Advances the hot reload timer by `delta`, polling for modified files
    /// every configured interval.
    ///
    /// Call once per frame. Returns the number of resources reloaded.
    pub fn update(&self, delta: Duration) -> usize {
        if !self.is_hot_reload_enabled() {
            return 0;
        }
        let due = {
            let mut elapsed = self
                .since_last_poll
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *elapsed += delta;
            if *elapsed >= self.config.hot_reload.poll_interval() {
                *elapsed = Duration::ZERO;
                true
            } else {
                false
            }
        };
        if due {
            self.reload_modified()
        } else {
            0
        }
    }

    /// Turns frame-driven hot reload on or off.
    pub fn set_hot_reload_enabled(&self, enabled: bool) {
        self.hot_reload_enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            *self
                .since_last_poll
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Duration::ZERO;
        }
    }

    /// Returns `true` if [`update`](Self::update) polls for modified files.
    pub fn is_hot_reload_enabled(&self) -> bool {
        self.hot_reload_enabled.load(Ordering::SeqCst)
    }

    /// Returns `true` if new requests are loaded on the background thread.
    pub fn is_async_loading(&self) -> bool {
        self.shared.is_async()
    }

    /// Returns `true` between [`initialize`](Self::initialize) and
    /// [`shutdown`](Self::shutdown).
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Returns the number of cached resources across all types.
    pub fn cached_count(&self) -> usize {
        self.shared.cache.len()
    }

    /// Returns the number of load tasks waiting for the loader thread.
    pub fn pending_tasks(&self) -> usize {
        self.shared
            .lock_loader()
            .as_ref()
            .map_or(0, LoaderThread::pending)
    }

    /// Returns a snapshot of the cache's size.
    pub fn stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    /// Returns the registry the manager reports metrics into.
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// Returns the configuration the manager was built with.
    pub fn config(&self) -> &ResourceManagerConfig {
        &self.config
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new(ResourceManagerConfig::default())
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("async_loading", &self.is_async_loading())
            .field("initialized", &self.is_initialized())
            .field("stats", &self.stats())
            .finish()
    }
}

fn construct<T: Resource>(path: &str) -> CachedResource {
    ResourceHandle::new(T::new(path)).erased()
}

/// Recovers a typed handle, reporting a tag shared by two types.
fn typed<T: Resource>(entry: CachedResource, key: &CacheKey) -> ResourceResult<ResourceHandle<T>> {
    let found = entry.type_name();
    ResourceHandle::from_erased(entry).ok_or_else(|| {
        log::error!(
            "'{key}' holds a {found}, not a {}",
            std::any::type_name::<T>()
        );
        ResourceError::TypeMismatch {
            tag: key.tag,
            path: key.path.clone(),
        }
    })
}
