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

//! Abstract definitions for metrics.

use std::fmt::{self, Display};
use std::time::Instant;

/// A structured identifier for a metric: a namespace and a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricId {
    /// The broad category of the metric (e.g., "resources").
    pub namespace: String,
    /// The specific name of the metric (e.g., "loads_total").
    pub name: String,
}

impl MetricId {
    /// Creates a new `MetricId` with a namespace and a name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// The fundamental type of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// A value that only ever increases.
    Counter,
    /// A value that can go up or down.
    Gauge,
    /// A distribution of measurements across buckets.
    Histogram,
}

/// The current value of a metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// A monotonically increasing count.
    Counter(u64),
    /// An arbitrary instantaneous value.
    Gauge(f64),
    /// The distribution of recorded samples.
    ///
    /// Raw samples are not retained, so memory stays constant however many
    /// are observed.
    Histogram {
        /// The number of samples recorded.
        count: u64,
        /// The sum of every sample recorded.
        sum: f64,
        /// The upper bounds of the buckets.
        bucket_bounds: Vec<f64>,
        /// The number of samples at or below each bound.
        bucket_counts: Vec<u64>,
    },
}

impl MetricValue {
    /// Returns the [`MetricType`] corresponding to this value.
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricValue::Counter(_) => MetricType::Counter,
            MetricValue::Gauge(_) => MetricType::Gauge,
            MetricValue::Histogram { .. } => MetricType::Histogram,
        }
    }

    /// Returns the value if this is a counter.
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value if this is a gauge.
    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(v) => Some(*v),
            _ => None,
        }
    }
}

/// A metric entry: its value plus descriptive metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric's identifier.
    pub id: MetricId,
    /// A human-readable description.
    pub description: String,
    /// The unit of measurement (e.g., "ms", "count").
    pub unit: String,
    /// The current value.
    pub value: MetricValue,
    /// When the value last changed.
    pub last_updated: Instant,
}

impl Metric {
    /// Creates a counter starting at zero.
    pub fn counter(id: MetricId, description: impl Into<String>) -> Self {
        Self::with_value(id, description, "count", MetricValue::Counter(0))
    }

    /// Creates a gauge starting at zero.
    pub fn gauge(id: MetricId, description: impl Into<String>, unit: impl Into<String>) -> Self {
        Self::with_value(id, description, unit, MetricValue::Gauge(0.0))
    }

    /// Creates an empty histogram with the given bucket upper bounds.
    pub fn histogram(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        bucket_bounds: Vec<f64>,
    ) -> Self {
        let bucket_counts = vec![0; bucket_bounds.len()];
        Self::with_value(
            id,
            description,
            unit,
            MetricValue::Histogram {
                count: 0,
                sum: 0.0,
                bucket_bounds,
                bucket_counts,
            },
        )
    }

    fn with_value(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        value: MetricValue,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            unit: unit.into(),
            value,
            last_updated: Instant::now(),
        }
    }

    /// Marks the metric as updated now.
    pub fn touch(&mut self) {
        self.last_updated = Instant::now();
    }
}

/// A specialized `Result` type for metric operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// An error that can occur within the metrics system.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricsError {
    /// The requested metric is not registered.
    #[error("metric not found: {0}")]
    MetricNotFound(MetricId),
    /// An operation was attempted on a metric of the wrong type.
    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        /// The type the operation needs.
        expected: MetricType,
        /// The type that is registered.
        found: MetricType,
    },
    /// The storage could not be accessed.
    #[error("storage error: {0}")]
    StorageError(String),
}
