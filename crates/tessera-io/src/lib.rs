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

//! # Tessera IO
//!
//! I/O plumbing used by the resource manager: a blocking FIFO queue that hands
//! load tasks to the loader thread, and the filesystem clock consulted by hot
//! reload.

#![warn(missing_docs)]

pub mod fs;
pub mod queue;

pub use fs::{FileClock, OsFileClock};
pub use queue::TaskQueue;
