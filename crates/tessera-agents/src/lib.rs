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

//! # Tessera Agents
//!
//! The tactical layer of the resource subsystem. Agents combine the cache from
//! `tessera-data`, the queue and filesystem access from `tessera-io` and the
//! metrics from `tessera-telemetry` into the API applications call.

#![warn(missing_docs)]

pub mod resource_agent;

pub use resource_agent::{ResourceEvent, ResourceManager, METRICS_NAMESPACE};
