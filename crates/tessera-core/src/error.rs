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

//! Defines the error types for the resource subsystem.
//!
//! Failures are normally communicated through resource state (`is_loaded()`),
//! so these errors never cross the public `load`/`load_async` boundary. They
//! exist for the `try_*` entry points, for logging, and for configuration.

use crate::resource::TypeTag;
use std::path::PathBuf;

/// A specialized `Result` type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// An error raised while acquiring, loading or reloading a resource.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// The resource's `load()` hook reported failure.
    #[error("failed to load resource '{path}'")]
    LoadFailed {
        /// The path of the resource that failed to load.
        path: String,
    },
    /// A resource hook or callback panicked; the panic was caught.
    #[error("resource hook '{hook}' panicked for '{path}': {message}")]
    Panicked {
        /// The path of the resource whose hook panicked.
        path: String,
        /// The hook that panicked, such as `load` or a completion callback.
        hook: &'static str,
        /// The panic payload, if it was a string.
        message: String,
    },
    /// A cached entry exists under the tag but holds a different Rust type.
    #[error("resource '{path}' is cached under tag '{tag}' with a different type")]
    TypeMismatch {
        /// The tag that collided.
        tag: TypeTag,
        /// The path of the entry.
        path: String,
    },
    /// Querying the filesystem for a resource's backing file failed.
    #[error("filesystem query failed for '{path}': {source}")]
    Io {
        /// The queried path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The background loader thread could not be started.
    #[error("failed to start loader thread '{name}': {source}")]
    LoaderSpawn {
        /// The name the thread was given.
        name: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

impl ResourceError {
    /// Builds a [`ResourceError::Panicked`] from a caught panic payload.
    pub fn from_panic(
        path: impl Into<String>,
        hook: &'static str,
        payload: &(dyn std::any::Any + Send),
    ) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked {
            path: path.into(),
            hook,
            message,
        }
    }
}

/// An error raised while reading a [`ResourceManagerConfig`](crate::ResourceManagerConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration file {path:?}: {source}")]
    Read {
        /// The file that was being read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration text is not valid RON for the expected schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// A value parsed correctly but is out of range.
    #[error("invalid configuration value for '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_stringified() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        let err = ResourceError::from_panic("a.txt", "load", payload.as_ref());
        assert_eq!(
            err.to_string(),
            "resource hook 'load' panicked for 'a.txt': boom"
        );

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        let err = ResourceError::from_panic("b.txt", "on_reload", payload.as_ref());
        assert!(err.to_string().ends_with("owned"));

        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u32);
        let err = ResourceError::from_panic("c.txt", "unload", payload.as_ref());
        assert!(err.to_string().contains("non-string panic payload"));
    }
}
