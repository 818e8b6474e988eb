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

//! Acts as the agent for the resource subsystem.
//!
//! [`ResourceManager`] is the public-facing API for requesting resources and
//! querying their state. It owns the cache, decides whether a request is
//! loaded on the calling thread or handed to the background loader, and
//! polls backing files for hot reload.

mod agent;
mod events;
mod loader;
mod metrics;
mod shared;

pub use agent::ResourceManager;
pub use events::ResourceEvent;
pub use metrics::METRICS_NAMESPACE;
