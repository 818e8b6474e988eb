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

//! Configuration for the resource manager.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings for polling-based hot reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HotReloadConfig {
    /// Whether `update()` polls backing files for changes.
    pub enabled: bool,
    /// Minimum time between two polls, in milliseconds.
    pub poll_interval_ms: u64,
}

impl HotReloadConfig {
    /// Returns the poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
        }
    }
}

/// Configuration for the resource manager.
///
/// # Examples
///
/// ```
/// use tessera_core::ResourceManagerConfig;
///
/// let config = ResourceManagerConfig::from_ron_str(
///     "(async_loading: true, hot_reload: (poll_interval_ms: 250))",
/// )
/// .unwrap();
/// assert!(config.async_loading);
/// assert_eq!(config.hot_reload.poll_interval_ms, 250);
/// assert!(config.hot_reload.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceManagerConfig {
    /// Whether new load requests go to the background loader thread.
    pub async_loading: bool,
    /// Name given to the background loader thread.
    pub loader_thread_name: String,
    /// Hot reload polling settings.
    pub hot_reload: HotReloadConfig,
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            async_loading: false,
            loader_thread_name: "tessera-loader".to_string(),
            hot_reload: HotReloadConfig::default(),
        }
    }
}

impl ResourceManagerConfig {
    /// Parses a configuration from RON text. Missing fields take their defaults.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a RON configuration file.
    pub fn from_ron_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ron_str(&text)?;
        log::debug!("Loaded resource manager configuration from {path:?}");
        Ok(config)
    }

    /// Serializes the configuration to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.loader_thread_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "loader_thread_name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.hot_reload.enabled && self.hot_reload.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "hot_reload.poll_interval_ms",
                reason: "must be greater than zero when hot reload is enabled".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ResourceManagerConfig::from_ron_str("()").unwrap();
        assert_eq!(config, ResourceManagerConfig::default());
        assert_eq!(config.hot_reload.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn round_trips_through_ron() {
        let config = ResourceManagerConfig {
            async_loading: true,
            loader_thread_name: "assets".to_string(),
            hot_reload: HotReloadConfig {
                enabled: false,
                poll_interval_ms: 50,
            },
        };
        let text = config.to_ron_string().unwrap();
        assert_eq!(ResourceManagerConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = ResourceManagerConfig::from_ron_str("(asynchronous: true)").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_poll_interval_is_rejected_when_enabled() {
        let err =
            ResourceManagerConfig::from_ron_str("(hot_reload: (poll_interval_ms: 0))").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "hot_reload.poll_interval_ms",
                ..
            }
        ));

        let ok = ResourceManagerConfig::from_ron_str(
            "(hot_reload: (enabled: false, poll_interval_ms: 0))",
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(loader_thread_name: \"io\")").unwrap();
        let config = ResourceManagerConfig::from_ron_file(file.path()).unwrap();
        assert_eq!(config.loader_thread_name, "io");

        let missing = ResourceManagerConfig::from_ron_file("does/not/exist.ron").unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
