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

use super::{Resource, ResourceBase, TypeTag};
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Owns a resource and unloads it when the memory is released.
///
/// This is the destructor-side cleanup trigger. The cache normally unloads a
/// resource when its logical count reaches zero, after which the resource is
/// no longer loaded and this drop does nothing.
struct ResourceBox<T: Resource>(T);

impl<T: Resource> Drop for ResourceBox<T> {
    fn drop(&mut self) {
        if self.0.is_loaded() {
            log::debug!(
                "Unloading '{}' ({}) on release of its last handle",
                self.0.path(),
                T::TYPE_TAG
            );
            self.0.unload();
        }
    }
}

/// A type-erased view of a cached resource.
///
/// The cache stores resources of many types side by side; this trait exposes
/// the lifecycle hooks it needs without knowing the concrete type, and lets a
/// typed [`ResourceHandle`] be recovered with [`ResourceHandle::from_erased`].
pub trait ErasedResource: Send + Sync + 'static {
    /// Returns the tag of the concrete resource type.
    fn type_tag(&self) -> TypeTag;

    /// Returns the Rust type name of the concrete resource, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Returns the resource's bookkeeping state.
    fn base(&self) -> &ResourceBase;

    /// Calls the resource's `load()` hook.
    fn load(&self) -> bool;

    /// Calls the resource's `unload()` hook.
    fn unload(&self);

    /// Calls the resource's `on_reload()` hook.
    fn on_reload(&self) -> bool;

    /// Converts the shared pointer for downcasting.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Resource> ErasedResource for ResourceBox<T> {
    fn type_tag(&self) -> TypeTag {
        T::TYPE_TAG
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn base(&self) -> &ResourceBase {
        self.0.base()
    }

    fn load(&self) -> bool {
        self.0.load()
    }

    fn unload(&self) {
        self.0.unload();
    }

    fn on_reload(&self) -> bool {
        self.0.on_reload()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl fmt::Debug for dyn ErasedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedResource")
            .field("tag", &self.type_tag())
            .field("path", &self.base().path())
            .field("loaded", &self.base().is_loaded())
            .field("ref_count", &self.base().ref_count())
            .finish()
    }
}

/// A thread-safe, shared handle to a resource.
///
/// Cloning a handle is cheap and does not touch the logical reference count;
/// logical references are taken and released through the resource manager.
/// The resource's memory is released when the last handle (including the one
/// held by the cache) is dropped.
pub struct ResourceHandle<T: Resource>(Arc<ResourceBox<T>>);

impl<T: Resource> ResourceHandle<T> {
    /// Wraps a freshly constructed resource.
    pub fn new(resource: T) -> Self {
        Self(Arc::new(ResourceBox(resource)))
    }

    /// Returns a type-erased pointer to the same instance.
    pub fn erased(&self) -> Arc<dyn ErasedResource> {
        self.0.clone()
    }

    /// Recovers a typed handle from an erased pointer.
    ///
    /// Returns `None` if the erased resource is not a `T`.
    pub fn from_erased(erased: Arc<dyn ErasedResource>) -> Option<Self> {
        erased
            .into_any()
            .downcast::<ResourceBox<T>>()
            .ok()
            .map(Self)
    }

    /// Returns `true` if both handles point to the same instance.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.0, &other.0)
    }
}

impl<T: Resource> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Resource> Deref for ResourceHandle<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0 .0
    }
}

impl<T: Resource> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("tag", &T::TYPE_TAG)
            .field("path", &self.path())
            .field("loaded", &self.is_loaded())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
