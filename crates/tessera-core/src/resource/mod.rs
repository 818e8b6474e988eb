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

//! Provides the foundational contract for every cacheable resource.
//!
//! This module defines the "common language" between the resource cache and the
//! concrete resource types that live in higher-level crates (textures, shaders,
//! meshes, ...). It knows nothing about how resources are stored or scheduled.
//!
//! The key components are:
//! - The [`Resource`] trait: the lifecycle hooks a resource type implements.
//! - [`ResourceBase`]: the identity, load flag and logical reference count every
//!   resource embeds.
//! - [`ResourceHandle`]: the shared, clonable handle callers hold.
//! - [`TypeTag`] and [`CacheKey`]: the explicit identity used by the cache.

mod base;
mod handle;

pub use base::*;
pub use handle::*;

use std::fmt;

/// The scheme prefix of virtual (file-less) resource paths.
pub const VIRTUAL_SCHEME: &str = "memory://";

/// Returns `true` if `path` names a virtual resource with no filesystem backing.
pub fn is_virtual_path(path: &str) -> bool {
    path.starts_with(VIRTUAL_SCHEME)
}

/// Builds the virtual path used for a resource created by name.
pub fn virtual_path(name: &str) -> String {
    format!("{VIRTUAL_SCHEME}{name}")
}

/// A stable, explicit identifier for a resource type.
///
/// Each resource type declares its own tag, so the cache never relies on
/// compiler-generated type information to partition its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeTag(&'static str);

impl TypeTag {
    /// Creates a tag from a stable name such as `"texture"`.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the tag's name.
    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// The composite key identifying a cached resource: `(type tag, path)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The resource type.
    pub tag: TypeTag,
    /// The file path, or a `memory://` virtual path.
    pub path: String,
}

impl CacheKey {
    /// Creates a key for the given tag and path.
    pub fn new(tag: TypeTag, path: impl Into<String>) -> Self {
        Self {
            tag,
            path: path.into(),
        }
    }

    /// Creates the key under which `T` would cache `path`.
    pub fn of<T: Resource>(path: impl Into<String>) -> Self {
        Self::new(T::TYPE_TAG, path)
    }

    /// Returns `true` if the key addresses a virtual resource.
    pub fn is_virtual(&self) -> bool {
        is_virtual_path(&self.path)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag, self.path)
    }
}

/// The lifecycle contract implemented by every resource type.
///
/// A resource is constructed unloaded from a path, loaded by [`load`](Resource::load)
/// (possibly on the loader thread), reloaded in place by
/// [`on_reload`](Resource::on_reload) when its file changes, and cleaned up by
/// [`unload`](Resource::unload) when its last logical reference is released.
///
/// Hooks take `&self` because the same instance is shared between the cache,
/// callers and the loader thread; implementations keep their payload behind
/// interior mutability and report state through [`ResourceBase::set_loaded`].
///
/// # Examples
///
/// ```
/// use std::sync::Mutex;
/// use tessera_core::{Resource, ResourceBase, TypeTag};
///
/// struct Text {
///     base: ResourceBase,
///     body: Mutex<String>,
/// }
///
/// impl Resource for Text {
///     const TYPE_TAG: TypeTag = TypeTag::new("text");
///
///     fn new(path: &str) -> Self {
///         Self { base: ResourceBase::new(path), body: Mutex::new(String::new()) }
///     }
///
///     fn base(&self) -> &ResourceBase {
///         &self.base
///     }
///
///     fn load(&self) -> bool {
///         match std::fs::read_to_string(self.path()) {
///             Ok(body) => {
///                 *self.body.lock().unwrap() = body;
///                 self.base.set_loaded(true);
///                 true
///             }
///             Err(_) => false,
///         }
///     }
///
///     fn unload(&self) {
///         self.body.lock().unwrap().clear();
///         self.base.set_loaded(false);
///     }
/// }
///
/// let text = Text::new("missing/readme.txt");
/// assert_eq!(text.name(), "readme");
/// assert!(!text.load());
/// assert!(!text.is_loaded());
/// ```
pub trait Resource: Send + Sync + Sized + 'static {
    /// The tag partitioning this type's entries in the cache.
    const TYPE_TAG: TypeTag;

    /// Constructs an unloaded resource for `path`.
    fn new(path: &str) -> Self;

    /// Returns the shared identity and bookkeeping state.
    fn base(&self) -> &ResourceBase;

    /// Populates the resource. Returns `true` on success.
    fn load(&self) -> bool;

    /// Releases the resource's state. Must be idempotent.
    fn unload(&self);

    /// Reloads the resource after its backing file changed.
    ///
    /// The default unloads (if loaded) and loads again. Types that need to keep
    /// settings across a reload override this.
    fn on_reload(&self) -> bool {
        if self.is_loaded() {
            self.unload();
        }
        self.load()
    }

    /// Returns `true` if the resource's state is valid and usable.
    fn is_loaded(&self) -> bool {
        self.base().is_loaded()
    }

    /// Returns the path the resource was created with.
    fn path(&self) -> &str {
        self.base().path()
    }

    /// Returns the name derived from the path's file stem.
    fn name(&self) -> &str {
        self.base().name()
    }

    /// Returns the current logical reference count.
    fn ref_count(&self) -> i32 {
        self.base().ref_count()
    }

    /// Takes a logical reference, returning the previous count.
    fn add_ref(&self) -> i32 {
        self.base().add_ref()
    }

    /// Releases a logical reference, returning the previous count.
    fn release_ref(&self) -> i32 {
        self.base().release_ref()
    }
}
