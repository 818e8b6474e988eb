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

//! A type-keyed, thread-safe cache of resource instances.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tessera_core::{is_virtual_path, CacheKey, ErasedResource, TypeTag};

use crate::pending::{PendingLoad, Resolution};

/// A type-erased, shared pointer to a cached resource.
pub type CachedResource = Arc<dyn ErasedResource>;

#[derive(Default)]
struct CacheState {
    /// One map per resource type, keyed by path.
    entries: HashMap<TypeTag, HashMap<String, CachedResource>>,
    /// Last observed write time of each file-backed path.
    file_times: HashMap<String, SystemTime>,
    /// Keys whose instance is currently being created.
    pending: HashMap<CacheKey, Arc<PendingLoad>>,
    /// Keys with a load task queued or running, and how many.
    loading: HashMap<CacheKey, usize>,
}

impl CacheState {
    fn entry(&self, key: &CacheKey) -> Option<&CachedResource> {
        self.entries.get(&key.tag)?.get(&key.path)
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CachedResource> {
        let by_path = self.entries.get_mut(&key.tag)?;
        let removed = by_path.remove(&key.path);
        if by_path.is_empty() {
            self.entries.remove(&key.tag);
        }
        removed
    }
}

/// The outcome of looking up a key for acquisition.
pub enum Acquire<'a> {
    /// The key is cached. The returned pointer is the cached instance.
    Hit(CachedResource),
    /// Another thread is creating the key; wait for it.
    InFlight(Arc<PendingLoad>),
    /// The key was absent and this caller is now responsible for creating it.
    Claimed(Claim<'a>),
}

/// The outcome of releasing one logical reference.
#[derive(Debug)]
pub enum Release {
    /// Nothing is cached under the key.
    Absent,
    /// The entry is still referenced; carries the remaining count.
    Retained(i32),
    /// The last reference was released and the entry was removed. The caller
    /// must run the resource's cleanup, outside any cache lock.
    Removed(CachedResource),
}

/// A snapshot of the cache's size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of resource types with at least one entry.
    pub types: usize,
    /// Number of cached entries across all types.
    pub entries: usize,
    /// Number of cached entries that are currently loaded.
    pub loaded: usize,
    /// Number of keys currently being created.
    pub pending: usize,
    /// Number of keys waiting on a background load.
    pub loading: usize,
    /// Number of paths with a recorded modification time.
    pub tracked_files: usize,
}

/// The exclusive right to create the instance for one key.
///
/// Exactly one claim exists per key at a time. It must end with
/// [`publish`](Claim::publish) or [`abandon`](Claim::abandon); dropping it
/// unresolved abandons it, so waiters are never left hanging.
pub struct Claim<'a> {
    cache: &'a ResourceCache,
    pending: Arc<PendingLoad>,
    finished: bool,
}

impl Claim<'_> {
    /// Inserts `resource` under the claimed key and wakes every waiter.
    pub fn publish(self, resource: CachedResource) {
        self.insert(resource, false);
    }

    /// Inserts `resource`, which has yet to be loaded, and marks its key as
    /// loading until [`ResourceCache::finish_loading`] is called.
    ///
    /// Loading keys are not polled for modification.
    pub fn publish_for_loading(self, resource: CachedResource) {
        self.insert(resource, true);
    }

    fn insert(mut self, resource: CachedResource, loading: bool) {
        {
            let mut state = self.cache.lock();
            let key = self.pending.key();
            state
                .entries
                .entry(key.tag)
                .or_default()
                .insert(key.path.clone(), resource);
            state.pending.remove(key);
            if loading {
                *state.loading.entry(key.clone()).or_default() += 1;
            }
        }
        self.finish(Resolution::Published);
    }

    /// Gives up on the key, handing the failed instance to every waiter.
    pub fn abandon(mut self, failed: Option<CachedResource>) {
        self.withdraw();
        self.finish(Resolution::Failed(failed));
    }

    fn withdraw(&self) {
        self.cache.lock().pending.remove(self.pending.key());
    }

    fn finish(&mut self, resolution: Resolution) {
        self.finished = true;
        self.pending.resolve(resolution);
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!(
                "Creation of '{}' ended without a result; releasing waiters",
                self.pending.key()
            );
            self.withdraw();
            self.finish(Resolution::Failed(None));
        }
    }
}

/// The process-wide store mapping `(type tag, path)` to a resource instance.
///
/// A single mutex guards the entry maps, the modification-time table and the
/// in-flight table. It is only held for map lookups and mutations; resource
/// hooks are never called while it is held.
#[derive(Default)]
pub struct ResourceCache {
    state: Mutex<CacheState>,
}

impl ResourceCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up `key` for a caller that wants a logical reference.
    ///
    /// On a hit the reference is taken while the lock is held, so the entry
    /// cannot be released to zero in between.
    pub fn acquire(&self, key: &CacheKey) -> Acquire<'_> {
        self.acquire_with(key, true)
    }

    /// Looks up `key` without taking a logical reference on a hit.
    pub fn acquire_untracked(&self, key: &CacheKey) -> Acquire<'_> {
        self.acquire_with(key, false)
    }

    fn acquire_with(&self, key: &CacheKey, add_ref: bool) -> Acquire<'_> {
        let mut state = self.lock();
        if let Some(resource) = state.entry(key) {
            if add_ref {
                resource.base().add_ref();
            }
            log::trace!("Cache hit for '{key}'");
            return Acquire::Hit(Arc::clone(resource));
        }
        if let Some(pending) = state.pending.get(key) {
            log::trace!("'{key}' is already being created");
            return Acquire::InFlight(Arc::clone(pending));
        }

        let pending = Arc::new(PendingLoad::new(key.clone()));
        state.pending.insert(key.clone(), Arc::clone(&pending));
        log::trace!("Cache miss for '{key}', claimed for creation");
        Acquire::Claimed(Claim {
            cache: self,
            pending,
            finished: false,
        })
    }

    /// Returns the cached instance for `key` without side effects.
    pub fn get(&self, key: &CacheKey) -> Option<CachedResource> {
        self.lock().entry(key).cloned()
    }

    /// Releases one logical reference on the entry under `key`.
    ///
    /// When the count reaches zero the entry (and its type's map, if it
    /// becomes empty) is removed before the lock is released.
    pub fn release(&self, key: &CacheKey) -> Release {
        let mut state = self.lock();
        let Some(resource) = state.entry(key) else {
            return Release::Absent;
        };
        let remaining = resource.base().release_ref() - 1;
        if remaining > 0 {
            return Release::Retained(remaining);
        }
        match state.remove(key) {
            Some(resource) => {
                state.file_times.remove(&key.path);
                Release::Removed(resource)
            }
            None => Release::Absent,
        }
    }

    /// Removes the entry under `key` only if it is still `resource`.
    ///
    /// Returns `true` if it was removed.
    pub fn evict_if_same(&self, key: &CacheKey, resource: &CachedResource) -> bool {
        let mut state = self.lock();
        let same = state
            .entry(key)
            .is_some_and(|cached| Arc::ptr_eq(cached, resource));
        if same {
            state.remove(key);
            state.file_times.remove(&key.path);
        }
        same
    }

    /// Ends one background load of `key` started by
    /// [`Claim::publish_for_loading`].
    pub fn finish_loading(&self, key: &CacheKey) {
        let mut state = self.lock();
        if let Some(count) = state.loading.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                state.loading.remove(key);
            }
        }
    }

    /// Records the last observed write time of `path`.
    pub fn record_file_time(&self, path: &str, time: SystemTime) {
        self.lock().file_times.insert(path.to_string(), time);
    }

    /// Finds file-backed entries whose backing file changed.
    ///
    /// `query` returns a path's current write time, `None` if it does not
    /// exist, or an error. An entry is collected when its file exists and its
    /// write time is newer than the recorded one (or none was recorded); the
    /// recorded time is updated as it is collected. Missing files and query
    /// errors leave the entry cached and untouched. Keys with a background
    /// load still queued or running are skipped; entries left unloaded by a
    /// failed reload are not.
    pub fn collect_modified<F>(&self, mut query: F) -> Vec<CachedResource>
    where
        F: FnMut(&Path) -> io::Result<Option<SystemTime>>,
    {
        let mut state = self.lock();
        let CacheState {
            entries,
            file_times,
            loading,
            ..
        } = &mut *state;

        let mut modified = Vec::new();
        let tagged = entries
            .iter()
            .flat_map(|(tag, by_path)| by_path.iter().map(move |entry| (*tag, entry)));
        for (tag, (path, resource)) in tagged {
            if is_virtual_path(path) {
                continue;
            }
            if loading.contains_key(&CacheKey::new(tag, path.as_str())) {
                log::trace!("'{path}' is still loading, not polled");
                continue;
            }
            let current = match query(Path::new(path)) {
                Ok(Some(time)) => time,
                Ok(None) => continue,
                Err(err) => {
                    log::warn!("Failed to check modification time for '{path}': {err}");
                    continue;
                }
            };
            let changed = file_times
                .get(path.as_str())
                .map_or(true, |recorded| current > *recorded);
            if changed {
                file_times.insert(path.clone(), current);
                modified.push(Arc::clone(resource));
            }
        }
        modified
    }

    /// Removes every entry and recorded time, returning the removed entries.
    ///
    /// Keys still being created are left to their claims.
    pub fn drain(&self) -> Vec<CachedResource> {
        let mut state = self.lock();
        state.file_times.clear();
        state.loading.clear();
        state
            .entries
            .drain()
            .flat_map(|(_, by_path)| by_path.into_values())
            .collect()
    }

    /// Returns the number of cached entries across all types.
    pub fn len(&self) -> usize {
        self.lock().entries.values().map(HashMap::len).sum()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Returns a snapshot of the cache's size.
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let mut stats = CacheStats {
            types: state.entries.len(),
            pending: state.pending.len(),
            loading: state.loading.len(),
            tracked_files: state.file_times.len(),
            ..CacheStats::default()
        };
        for resource in state.entries.values().flat_map(HashMap::values) {
            stats.entries += 1;
            if resource.base().is_loaded() {
                stats.loaded += 1;
            }
        }
        stats
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use std::time::Duration;
    use tessera_core::{Resource, ResourceBase, ResourceHandle};

    struct Blob {
        base: ResourceBase,
    }

    impl Resource for Blob {
        const TYPE_TAG: TypeTag = TypeTag::new("blob");

        fn new(path: &str) -> Self {
            Self {
                base: ResourceBase::new(path),
            }
        }

        fn base(&self) -> &ResourceBase {
            &self.base
        }

        fn load(&self) -> bool {
            self.base.set_loaded(true);
            true
        }

        fn unload(&self) {
            self.base.set_loaded(false);
        }
    }

    fn create(cache: &ResourceCache, path: &str) -> CachedResource {
        let key = CacheKey::of::<Blob>(path);
        match cache.acquire(&key) {
            Acquire::Claimed(claim) => {
                let handle = ResourceHandle::new(Blob::new(path));
                handle.add_ref();
                handle.load();
                let erased = handle.erased();
                claim.publish(Arc::clone(&erased));
                erased
            }
            _ => panic!("expected a claim for '{path}'"),
        }
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn hit_takes_a_reference_and_untracked_does_not() {
        let cache = ResourceCache::new();
        let created = create(&cache, "a.bin");
        let key = CacheKey::of::<Blob>("a.bin");

        match cache.acquire(&key) {
            Acquire::Hit(hit) => assert!(Arc::ptr_eq(&hit, &created)),
            _ => panic!("expected a hit"),
        }
        assert_eq!(created.base().ref_count(), 2);

        assert!(matches!(cache.acquire_untracked(&key), Acquire::Hit(_)));
        assert_eq!(created.base().ref_count(), 2);
    }

    #[test]
    fn second_miss_sees_the_claim_in_flight() {
        let cache = ResourceCache::new();
        let key = CacheKey::of::<Blob>("b.bin");
        let Acquire::Claimed(claim) = cache.acquire(&key) else {
            panic!("expected a claim");
        };
        let Acquire::InFlight(pending) = cache.acquire(&key) else {
            panic!("expected the key to be in flight");
        };
        assert_eq!(cache.stats().pending, 1);
        assert!(cache.get(&key).is_none());

        let handle = ResourceHandle::new(Blob::new("b.bin"));
        handle.add_ref();
        claim.publish(handle.erased());

        assert!(matches!(pending.wait(), Resolution::Published));
        assert!(cache.get(&key).is_some());
        assert_eq!(cache.stats().pending, 0);
    }

    #[test]
    fn dropped_claim_releases_waiters_with_failure() {
        let cache = ResourceCache::new();
        let key = CacheKey::of::<Blob>("c.bin");
        let claim = match cache.acquire(&key) {
            Acquire::Claimed(claim) => claim,
            _ => panic!("expected a claim"),
        };
        let pending = match cache.acquire(&key) {
            Acquire::InFlight(pending) => pending,
            _ => panic!("expected in flight"),
        };
        drop(claim);
        assert!(matches!(pending.wait(), Resolution::Failed(None)));
        assert!(matches!(cache.acquire(&key), Acquire::Claimed(_)));
    }

    #[test]
    fn release_removes_at_zero_and_prunes_the_type_map() {
        let cache = ResourceCache::new();
        let created = create(&cache, "d.bin");
        let key = CacheKey::of::<Blob>("d.bin");
        cache.record_file_time("d.bin", at(10));
        created.base().add_ref();

        assert!(matches!(cache.release(&key), Release::Retained(1)));
        match cache.release(&key) {
            Release::Removed(removed) => assert!(Arc::ptr_eq(&removed, &created)),
            other => panic!("expected removal, got {other:?}"),
        }
        assert_eq!(cache.stats().types, 0);
        assert_eq!(cache.stats().tracked_files, 0);
        assert!(matches!(cache.release(&key), Release::Absent));
        assert_eq!(created.base().ref_count(), 0);
    }

    #[test]
    fn evict_only_removes_the_same_instance() {
        let cache = ResourceCache::new();
        let created = create(&cache, "e.bin");
        let key = CacheKey::of::<Blob>("e.bin");
        let stranger = ResourceHandle::new(Blob::new("e.bin")).erased();

        assert!(!cache.evict_if_same(&key, &stranger));
        assert!(cache.get(&key).is_some());
        assert!(cache.evict_if_same(&key, &created));
        assert!(cache.is_empty());
    }

    #[test]
    fn collect_modified_compares_against_recorded_times() {
        let cache = ResourceCache::new();
        let _fresh = create(&cache, "fresh.bin");
        let _stale = create(&cache, "stale.bin");
        let _untracked = create(&cache, "untracked.bin");
        let _gone = create(&cache, "gone.bin");
        let _virtual = create(&cache, "memory://scratch");
        cache.record_file_time("fresh.bin", at(100));
        cache.record_file_time("stale.bin", at(100));

        let disk: Map<&str, SystemTime> = [
            ("fresh.bin", at(100)),
            ("stale.bin", at(200)),
            ("untracked.bin", at(50)),
        ]
        .into_iter()
        .collect();
        let query = |path: &Path| -> io::Result<Option<SystemTime>> {
            Ok(path.to_str().and_then(|p| disk.get(p)).copied())
        };

        let mut modified: Vec<String> = cache
            .collect_modified(query)
            .iter()
            .map(|r| r.base().path().to_string())
            .collect();
        modified.sort();
        assert_eq!(modified, vec!["stale.bin", "untracked.bin"]);
        assert_eq!(cache.stats().tracked_files, 3);

        assert!(cache.collect_modified(query).is_empty());
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn query_errors_are_skipped() {
        let cache = ResourceCache::new();
        let loaded = create(&cache, "denied.bin");

        let modified = cache.collect_modified(|_| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        });
        assert!(modified.is_empty());
        assert!(cache.get(&CacheKey::of::<Blob>("denied.bin")).is_some());
        assert!(loaded.base().is_loaded());
    }

    #[test]
    fn loading_keys_are_skipped_until_finished() {
        let cache = ResourceCache::new();
        let key = CacheKey::of::<Blob>("queued.bin");
        let Acquire::Claimed(claim) = cache.acquire(&key) else {
            panic!("expected a claim");
        };
        claim.publish_for_loading(ResourceHandle::new(Blob::new("queued.bin")).erased());
        let idle = create(&cache, "idle.bin");
        idle.unload();
        assert_eq!(cache.stats().loading, 1);

        let everything = |_: &Path| -> io::Result<Option<SystemTime>> { Ok(Some(at(5))) };
        let first: Vec<String> = cache
            .collect_modified(everything)
            .iter()
            .map(|r| r.base().path().to_string())
            .collect();
        assert_eq!(first, vec!["idle.bin"]);

        cache.finish_loading(&key);
        assert_eq!(cache.stats().loading, 0);
        let second = cache.collect_modified(everything);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].base().path(), "queued.bin");
    }

    #[test]
    fn drain_empties_everything() {
        let cache = ResourceCache::new();
        create(&cache, "f.bin");
        create(&cache, "g.bin");
        cache.record_file_time("f.bin", at(1));

        let drained = cache.drain();
        assert_eq!(drained.len(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn stats_count_loaded_entries() {
        let cache = ResourceCache::new();
        create(&cache, "z.bin");
        let idle = create(&cache, "a.bin");
        idle.unload();
        let stats = cache.stats();
        assert_eq!((stats.types, stats.entries, stats.loaded), (1, 2, 1));
    }
}
