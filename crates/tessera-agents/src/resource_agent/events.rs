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

//! Notifications emitted by the resource manager.

use tessera_core::CacheKey;

/// A change in the state of a cached resource.
///
/// Sent through the channel attached with
/// [`ResourceManager::with_event_sender`](super::ResourceManager::with_event_sender).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    /// A resource finished loading successfully.
    Loaded {
        /// The resource's cache key.
        key: CacheKey,
    },
    /// A resource failed to load.
    LoadFailed {
        /// The resource's cache key.
        key: CacheKey,
        /// Why the load failed.
        reason: String,
    },
    /// A resource was reloaded after its backing file changed.
    Reloaded {
        /// The resource's cache key.
        key: CacheKey,
        /// Whether `on_reload()` succeeded.
        success: bool,
    },
    /// A resource left the cache and was cleaned up.
    Unloaded {
        /// The resource's cache key.
        key: CacheKey,
    },
}

impl ResourceEvent {
    /// Returns the key of the resource the event is about.
    pub fn key(&self) -> &CacheKey {
        match self {
            Self::Loaded { key }
            | Self::LoadFailed { key, .. }
            | Self::Reloaded { key, .. }
            | Self::Unloaded { key } => key,
        }
    }
}
