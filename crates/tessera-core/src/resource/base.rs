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

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Identity and bookkeeping state embedded in every resource.
///
/// The logical reference count tracked here is independent of the memory
/// ownership of the resource: a handle (or a pending callback) may keep the
/// memory alive after the count reached zero. Teardown is driven by the count.
#[derive(Debug)]
pub struct ResourceBase {
    path: String,
    name: String,
    loaded: AtomicBool,
    ref_count: AtomicI32,
}

impl ResourceBase {
    /// Creates the state for an unloaded resource with no references.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = Path::new(&path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            loaded: AtomicBool::new(false),
            ref_count: AtomicI32::new(0),
        }
    }

    /// Returns the path the resource was created with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the path's file stem.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the owning resource reported itself loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Records the owning resource's load state. Called from its hooks.
    pub fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::Release);
    }

    /// Returns the current logical reference count.
    pub fn ref_count(&self) -> i32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Increments the logical reference count and returns the previous value.
    pub fn add_ref(&self) -> i32 {
        self.ref_count.fetch_add(1, Ordering::AcqRel)
    }

    /// Decrements the logical reference count and returns the previous value.
    ///
    /// The count never drops below zero; releasing an unreferenced resource
    /// returns `0` and leaves the count untouched.
    pub fn release_ref(&self) -> i32 {
        self.ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count > 0).then(|| count - 1)
            })
            .unwrap_or_else(|current| current)
    }
}
