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

//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use tessera_core::{Resource, ResourceBase, TypeTag};

/// A resource whose behaviour is driven by its path:
/// - `slow` in the path makes `load()` take 50ms,
/// - `fail` makes `load()` return `false`,
/// - `panic` makes `load()` panic.
pub struct Probe {
    base: ResourceBase,
    pub loads: AtomicUsize,
    pub unloads: AtomicUsize,
    pub reloads: AtomicUsize,
}

impl Probe {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl Resource for Probe {
    const TYPE_TAG: TypeTag = TypeTag::new("probe");

    fn new(path: &str) -> Self {
        Self {
            base: ResourceBase::new(path),
            loads: AtomicUsize::new(0),
            unloads: AtomicUsize::new(0),
            reloads: AtomicUsize::new(0),
        }
    }

    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn load(&self) -> bool {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let path = self.base.path();
        if path.contains("slow") {
            thread::sleep(Duration::from_millis(50));
        }
        if path.contains("panic") {
            panic!("corrupt probe '{path}'");
        }
        if path.contains("fail") {
            return false;
        }
        self.base.set_loaded(true);
        true
    }

    fn unload(&self) {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        self.base.set_loaded(false);
    }

    fn on_reload(&self) -> bool {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        self.unload();
        self.load()
    }
}

/// A second type that claims the same tag as [`Probe`].
pub struct Impostor {
    base: ResourceBase,
}

impl Resource for Impostor {
    const TYPE_TAG: TypeTag = TypeTag::new("probe");

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
