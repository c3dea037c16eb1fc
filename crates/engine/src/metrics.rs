// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! OpenTelemetry instruments for plugin drivers.
//!
//! Instruments come from the global meter, so they are no-ops unless the host
//! installs a meter provider.

use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;
use std::time::Duration;

pub(crate) struct DriverMetrics {
    processed: Counter<u64>,
    dropped: Counter<u64>,
    throttled: Counter<u64>,
    faults: Counter<u64>,
    execution: Histogram<f64>,
    labels: [KeyValue; 1],
}

impl DriverMetrics {
    pub(crate) fn new(plugin: &str) -> Self {
        let meter = opentelemetry::global::meter("ndkit_engine");
        Self {
            processed: meter
                .u64_counter("ndkit.plugin.arrays_processed")
                .with_description("Arrays passed to a plugin's processing routine")
                .build(),
            dropped: meter
                .u64_counter("ndkit.plugin.arrays_dropped")
                .with_description("Arrays released because the plugin's queue was full or torn down")
                .build(),
            throttled: meter
                .u64_counter("ndkit.plugin.arrays_throttled")
                .with_description("Arrays skipped because they arrived before min_callback_time")
                .build(),
            faults: meter
                .u64_counter("ndkit.plugin.processing_faults")
                .with_description("Processing routine errors and panics")
                .build(),
            execution: meter
                .f64_histogram("ndkit.plugin.execution_seconds")
                .with_description("Time spent processing one array")
                .build(),
            labels: [KeyValue::new("plugin", plugin.to_string())],
        }
    }

    pub(crate) fn record_processed(&self, elapsed: Duration) {
        self.processed.add(1, &self.labels);
        self.execution.record(elapsed.as_secs_f64(), &self.labels);
    }

    pub(crate) fn record_dropped(&self, count: u64) {
        self.dropped.add(count, &self.labels);
    }

    pub(crate) fn record_throttled(&self) {
        self.throttled.add(1, &self.labels);
    }

    pub(crate) fn record_fault(&self) {
        self.faults.add(1, &self.labels);
    }
}
