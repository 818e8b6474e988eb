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

//! Metric handles updated by the resource manager.

use tessera_core::telemetry::MetricsResult;
use tessera_telemetry::{
    CounterHandle, GaugeHandle, HistogramHandle, MetricsRegistry, ScopedMetricTimer,
};

/// The namespace under which every resource metric is registered.
pub const METRICS_NAMESPACE: &str = "resources";

/// A collection of metric handles used by the resource manager.
pub(crate) struct ResourceMetrics {
    /// Successful `load()` calls, synchronous or not.
    loads_total: CounterHandle,
    /// Failed or panicked `load()` and `on_reload()` calls.
    load_failures_total: CounterHandle,
    /// Successful hot reloads.
    reloads_total: CounterHandle,
    /// Resources cleaned up after leaving the cache.
    unloads_total: CounterHandle,
    /// Number of cached entries.
    cached: GaugeHandle,
    /// Time spent in `load()`, in milliseconds.
    load_time: HistogramHandle,
}

impl ResourceMetrics {
    pub(crate) fn register(registry: &MetricsRegistry) -> MetricsResult<Self> {
        Ok(Self {
            loads_total: registry.register_counter(
                METRICS_NAMESPACE,
                "loads_total",
                "Total number of resources loaded",
            )?,
            load_failures_total: registry.register_counter(
                METRICS_NAMESPACE,
                "load_failures_total",
                "Total number of failed loads and reloads",
            )?,
            reloads_total: registry.register_counter(
                METRICS_NAMESPACE,
                "reloads_total",
                "Total number of hot reloads",
            )?,
            unloads_total: registry.register_counter(
                METRICS_NAMESPACE,
                "unloads_total",
                "Total number of resources cleaned up",
            )?,
            cached: registry.register_gauge(
                METRICS_NAMESPACE,
                "cached",
                "Number of cached resources",
                "count",
            )?,
            load_time: registry.register_histogram(
                METRICS_NAMESPACE,
                "load_time",
                "Resource load time",
                "ms",
                vec![1.0, 5.0, 16.0, 33.0, 100.0, 500.0],
            )?,
        })
    }

    /// Starts timing a `load()` call.
    pub(crate) fn time_load(&self) -> ScopedMetricTimer<'_> {
        ScopedMetricTimer::new(&self.load_time)
    }

    pub(crate) fn record_load(&self, success: bool) {
        if success {
            bump(&self.loads_total);
        } else {
            bump(&self.load_failures_total);
        }
    }

    pub(crate) fn record_reload(&self, success: bool) {
        if success {
            bump(&self.reloads_total);
        } else {
            bump(&self.load_failures_total);
        }
    }

    pub(crate) fn record_unload(&self) {
        bump(&self.unloads_total);
    }

    pub(crate) fn set_cached(&self, count: usize) {
        if let Err(e) = self.cached.set(count as f64) {
            log::warn!("Failed to update '{}': {e}", self.cached.id());
        }
    }
}

fn bump(counter: &CounterHandle) {
    if let Err(e) = counter.increment() {
        log::warn!("Failed to update '{}': {e}", counter.id());
    }
}
