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

//! # Tessera Core
//!
//! Foundational crate containing the resource contract, cache identity types,
//! configuration and error definitions shared by the rest of the workspace.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod resource;
pub mod telemetry;
pub mod utils;

pub use config::{HotReloadConfig, ResourceManagerConfig};
pub use error::{ConfigError, ResourceError, ResourceResult};
pub use resource::{
    is_virtual_path, virtual_path, CacheKey, ErasedResource, Resource, ResourceBase,
    ResourceHandle, TypeTag, VIRTUAL_SCHEME,
};
pub use utils::timer::Stopwatch;
