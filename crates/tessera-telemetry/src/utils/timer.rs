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

//! RAII timers that record elapsed time into a histogram.

use crate::metrics::registry::HistogramHandle;
use tessera_core::Stopwatch;

/// Times the scope it lives in and records the duration, in milliseconds,
/// into a histogram when dropped.
///
/// The sample is recorded on every exit path, early returns included.
pub struct ScopedMetricTimer<'a> {
    stopwatch: Stopwatch,
    histogram: &'a HistogramHandle,
}

impl<'a> ScopedMetricTimer<'a> {
    /// Starts a timer for `histogram`.
    pub fn new(histogram: &'a HistogramHandle) -> Self {
        Self {
            stopwatch: Stopwatch::new(),
            histogram,
        }
    }
}

impl Drop for ScopedMetricTimer<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.histogram.observe(self.stopwatch.elapsed_ms()) {
            log::warn!("Failed to record timing for '{}': {e}", self.histogram.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricsRegistry;
    use tessera_core::telemetry::MetricValue;

    fn sample_count(histogram: &HistogramHandle) -> u64 {
        match histogram.get_metric().unwrap().value {
            MetricValue::Histogram { count, .. } => count,
            _ => panic!("Expected histogram metric"),
        }
    }

    #[test]
    fn records_on_drop() {
        let registry = MetricsRegistry::new();
        let histogram = registry
            .register_histogram("test", "scope", "", "ms", vec![10.0])
            .unwrap();
        {
            let _timer = ScopedMetricTimer::new(&histogram);
        }
        assert_eq!(sample_count(&histogram), 1);
    }

    #[test]
    fn records_on_early_return() {
        fn timed(histogram: &HistogramHandle, bail: bool) -> bool {
            let _timer = ScopedMetricTimer::new(histogram);
            if bail {
                return false;
            }
            true
        }

        let registry = MetricsRegistry::new();
        let histogram = registry
            .register_histogram("test", "scope", "", "ms", vec![10.0])
            .unwrap();
        assert!(!timed(&histogram, true));
        assert!(timed(&histogram, false));
        assert_eq!(sample_count(&histogram), 2);
    }
}
