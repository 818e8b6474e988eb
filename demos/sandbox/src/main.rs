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

// Tessera Sandbox
// Loads a few text assets, edits one on disk and watches it hot reload.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use tessera_agents::{ResourceEvent, ResourceManager, METRICS_NAMESPACE};
use tessera_core::{Resource, ResourceBase, ResourceManagerConfig, TypeTag};

const FRAME: Duration = Duration::from_millis(50);
const FRAMES: u32 = 30;
const EDIT_AT_FRAME: u32 = 10;

/// A UTF-8 text asset. Virtual instances are filled with [`TextAsset::set_text`].
struct TextAsset {
    base: ResourceBase,
    text: Mutex<Option<String>>,
}

impl TextAsset {
    fn text(&self) -> String {
        self.text
            .lock()
            .map(|text| text.clone().unwrap_or_default())
            .unwrap_or_default()
    }

    fn set_text(&self, text: impl Into<String>) {
        if let Ok(mut slot) = self.text.lock() {
            *slot = Some(text.into());
            self.base.set_loaded(true);
        }
    }
}

impl Resource for TextAsset {
    const TYPE_TAG: TypeTag = TypeTag::new("text");

    fn new(path: &str) -> Self {
        Self {
            base: ResourceBase::new(path),
            text: Mutex::new(None),
        }
    }

    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn load(&self) -> bool {
        match fs::read_to_string(self.base.path()) {
            Ok(text) => {
                self.set_text(text);
                true
            }
            Err(e) => {
                log::warn!("Cannot read '{}': {e}", self.base.path());
                false
            }
        }
    }

    fn unload(&self) {
        if let Ok(mut slot) = self.text.lock() {
            *slot = None;
        }
        self.base.set_loaded(false);
    }
}

fn load_config() -> Result<ResourceManagerConfig> {
    match std::env::args().nth(1) {
        Some(path) => ResourceManagerConfig::from_ron_file(&path)
            .with_context(|| format!("Failed to load configuration from {path}")),
        None => Ok(ResourceManagerConfig::from_ron_str(
            "(async_loading: true, hot_reload: (poll_interval_ms: 250))",
        )?),
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().context("asset path is not valid UTF-8")
}

fn log_events(events: &Receiver<ResourceEvent>) {
    for event in events.try_iter() {
        log::info!("Event: {event:?}");
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    log::info!("Configuration:\n{}", config.to_ron_string()?);

    let assets = tempfile::tempdir()?;
    let greeting = assets.path().join("greeting.txt");
    let credits = assets.path().join("credits.txt");
    fs::write(&greeting, "Hello from disk")?;
    fs::write(&credits, "Made with Tessera")?;

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let manager = ResourceManager::new(config).with_event_sender(event_tx);
    manager.initialize()?;

    // Blocking load; in async mode it returns at once and loads in the background.
    let greeting_asset = manager
        .load::<TextAsset>(path_str(&greeting)?)
        .context("greeting failed to load")?;

    manager.load_async::<TextAsset, _>(path_str(&credits)?, |credits| {
        log::info!(
            "Credits ready (loaded: {}): {:?}",
            credits.is_loaded(),
            credits.text()
        );
    });

    let hud = manager
        .create_resource::<TextAsset>("HUD")
        .context("HUD could not be created")?;
    hud.set_text("Score: 0");

    for frame in 0..FRAMES {
        if frame == EDIT_AT_FRAME {
            fs::write(&greeting, "Hello again, edited on disk")?;
            // Coarse filesystem clocks may not tick between two quick writes.
            File::options()
                .write(true)
                .open(&greeting)?
                .set_modified(SystemTime::now() + Duration::from_secs(1))?;
            log::info!("Edited {}", greeting.display());
        }

        let reloaded = manager.update(FRAME);
        if reloaded > 0 {
            log::info!("Frame {frame}: greeting is now {:?}", greeting_asset.text());
        }
        hud.set_text(format!("Score: {}", frame * 10));
        log_events(&event_rx);
        thread::sleep(FRAME);
    }

    log::info!("HUD shows {:?}", hud.text());
    for metric in manager.metrics().get_namespace_metrics(METRICS_NAMESPACE) {
        log::info!("{} = {:?}", metric.id, metric.value);
    }

    manager.unload::<TextAsset>(path_str(&greeting)?);
    manager.shutdown();
    log_events(&event_rx);
    Ok(())
}
