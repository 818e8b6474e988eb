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

//! Registry for managing metrics.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tessera_core::telemetry::{
    Metric, MetricId, MetricType, MetricValue, MetricsError, MetricsResult,
};

type Store = Arc<RwLock<HashMap<MetricId, Metric>>>;

fn read(store: &Store) -> RwLockReadGuard<'_, HashMap<MetricId, Metric>> {
    store.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(store: &Store) -> RwLockWriteGuard<'_, HashMap<MetricId, Metric>> {
    store.write().unwrap_or_else(PoisonError::into_inner)
}

/// Applies `update` to the metric `id`, which must be of type `expected`.
fn update<R>(
    store: &Store,
    id: &MetricId,
    expected: MetricType,
    apply: impl FnOnce(&mut MetricValue) -> R,
) -> MetricsResult<R> {
    let mut metrics = write(store);
    let metric = metrics
        .get_mut(id)
        .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))?;
    let found = metric.value.metric_type();
    if found != expected {
        return Err(MetricsError::TypeMismatch { expected, found });
    }
    let result = apply(&mut metric.value);
    metric.touch();
    Ok(result)
}

fn snapshot(store: &Store, id: &MetricId) -> MetricsResult<Metric> {
    read(store)
        .get(id)
        .cloned()
        .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))
}

/// Central registry for metrics.
///
/// Cloning the registry is cheap and every clone sees the same metrics, so a
/// single registry can be handed to several components. Registering an id
/// that already exists with the same type returns a handle to the existing
/// metric instead of resetting it.
#[derive(Debug, Clone, Default)]
pub struct MetricsRegistry {
    store: Store,
}

impl MetricsRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, metric: Metric) -> MetricsResult<MetricId> {
        let mut metrics = write(&self.store);
        let id = metric.id.clone();
        match metrics.get(&id) {
            Some(existing) if existing.value.metric_type() != metric.value.metric_type() => {
                Err(MetricsError::TypeMismatch {
                    expected: metric.value.metric_type(),
                    found: existing.value.metric_type(),
                })
            }
            Some(_) => Ok(id),
            None => {
                log::trace!("Registered metric '{id}'");
                metrics.insert(id.clone(), metric);
                Ok(id)
            }
        }
    }

    /// Registers a counter metric.
    pub fn register_counter(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> MetricsResult<CounterHandle> {
        let id = MetricId::new(namespace, name);
        let id = self.register(Metric::counter(id, description))?;
        Ok(CounterHandle {
            id,
            store: Arc::clone(&self.store),
        })
    }

    /// Registers a gauge metric.
    pub fn register_gauge(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> MetricsResult<GaugeHandle> {
        let id = MetricId::new(namespace, name);
        let id = self.register(Metric::gauge(id, description, unit))?;
        Ok(GaugeHandle {
            id,
            store: Arc::clone(&self.store),
        })
    }

    /// Registers a histogram metric with the given bucket upper bounds.
    pub fn register_histogram(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
        buckets: Vec<f64>,
    ) -> MetricsResult<HistogramHandle> {
        let id = MetricId::new(namespace, name);
        let id = self.register(Metric::histogram(id, description, unit, buckets))?;
        Ok(HistogramHandle {
            id,
            store: Arc::clone(&self.store),
        })
    }

    /// Returns a snapshot of a metric.
    pub fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        snapshot(&self.store, id)
    }

    /// Returns snapshots of every metric in a namespace.
    pub fn get_namespace_metrics(&self, namespace: &str) -> Vec<Metric> {
        read(&self.store)
            .values()
            .filter(|m| m.id.namespace == namespace)
            .cloned()
            .collect()
    }
}

/// Handle for counter operations.
#[derive(Debug, Clone)]
pub struct CounterHandle {
    id: MetricId,
    store: Store,
}

impl CounterHandle {
    /// Increments the counter by 1.
    pub fn increment(&self) -> MetricsResult<u64> {
        self.increment_by(1)
    }

    /// Increments the counter by `amount`, returning the new value.
    pub fn increment_by(&self, amount: u64) -> MetricsResult<u64> {
        update(&self.store, &self.id, MetricType::Counter, |value| match value {
            MetricValue::Counter(count) => {
                *count = count.saturating_add(amount);
                *count
            }
            _ => 0,
        })
    }

    /// Returns the current counter value.
    pub fn get(&self) -> MetricsResult<u64> {
        let metric = snapshot(&self.store, &self.id)?;
        metric.value.as_counter().ok_or(MetricsError::TypeMismatch {
            expected: MetricType::Counter,
            found: metric.value.metric_type(),
        })
    }

    /// Returns the metric ID.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

/// Handle for gauge operations.
#[derive(Debug, Clone)]
pub struct GaugeHandle {
    id: MetricId,
    store: Store,
}

impl GaugeHandle {
    /// Sets the gauge to a specific value.
    pub fn set(&self, value: f64) -> MetricsResult<()> {
        update(&self.store, &self.id, MetricType::Gauge, |current| {
            *current = MetricValue::Gauge(value);
        })
    }

    /// Returns the current gauge value.
    pub fn get(&self) -> MetricsResult<f64> {
        let metric = snapshot(&self.store, &self.id)?;
        metric.value.as_gauge().ok_or(MetricsError::TypeMismatch {
            expected: MetricType::Gauge,
            found: metric.value.metric_type(),
        })
    }

    /// Returns the metric ID.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

/// Handle for histogram operations.
#[derive(Debug, Clone)]
pub struct HistogramHandle {
    id: MetricId,
    store: Store,
}

impl HistogramHandle {
    /// Records a sample in the histogram.
    pub fn observe(&self, sample: f64) -> MetricsResult<()> {
        update(&self.store, &self.id, MetricType::Histogram, |value| {
            if let MetricValue::Histogram {
                count,
                sum,
                bucket_bounds,
                bucket_counts,
            } = value
            {
                *count = count.saturating_add(1);
                *sum += sample;
                for (bound, count) in bucket_bounds.iter().zip(bucket_counts.iter_mut()) {
                    if sample <= *bound {
                        *count += 1;
                    }
                }
            }
        })
    }

    /// Returns the metric ID.
    pub fn id(&self) -> &MetricId {
        &self.id
    }

    /// Returns the full histogram metric.
    pub fn get_metric(&self) -> MetricsResult<Metric> {
        snapshot(&self.store, &self.id)
    }
}
