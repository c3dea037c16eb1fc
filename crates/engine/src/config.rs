// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Plugin driver configuration.

use ndkit_core::{NdKitError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{
    DEFAULT_DEQUEUE_TIMEOUT, DEFAULT_MAX_THREADS, DEFAULT_NUM_THREADS, DEFAULT_OUTPUT_ADDRESSES,
    DEFAULT_QUEUE_SIZE, MAX_QUEUE_SIZE,
};

const fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

const fn default_num_threads() -> usize {
    DEFAULT_NUM_THREADS
}

const fn default_max_threads() -> usize {
    DEFAULT_MAX_THREADS
}

#[allow(clippy::cast_possible_truncation)]
const fn default_dequeue_timeout_ms() -> u64 {
    DEFAULT_DEQUEUE_TIMEOUT.as_millis() as u64
}

const fn default_max_addr() -> usize {
    DEFAULT_OUTPUT_ADDRESSES
}

const fn default_true() -> bool {
    true
}

/// Construction-time configuration of a plugin driver.
///
/// Everything except `name`, `max_threads`, `max_addr` and `thread_stack_size` can be
/// changed later through the driver's control surface.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct PluginConfig {
    /// Port name of this plugin. Other plugins use it as their `array_port`.
    pub name: String,
    /// Name of the upstream port to take arrays from.
    #[serde(default)]
    pub array_port: String,
    /// Address on the upstream port.
    #[serde(default)]
    pub array_addr: usize,
    /// Capacity of the handoff queue, in arrays (default: 16)
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Process arrays on the producer's thread (no queue, no drops, stalls the producer)
    #[serde(default)]
    pub blocking_callbacks: bool,
    /// Register for upstream callbacks. Plugins start disabled unless this is set.
    #[serde(default)]
    pub enable_callbacks: bool,
    /// Worker threads draining the queue (default: 1). 0 processes on the producer's thread.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    /// Upper bound for `num_threads` (default: 4)
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    /// Minimum time in seconds between processed arrays (default: 0, no throttling)
    #[serde(default)]
    pub min_callback_time: f64,
    /// Worker dequeue timeout in milliseconds (default: 100)
    #[serde(default = "default_dequeue_timeout_ms")]
    pub dequeue_timeout_ms: u64,
    /// Stack size for worker threads in bytes. Uses the platform default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_stack_size: Option<usize>,
    /// Connect to the upstream port at start when callbacks are enabled (default: true)
    #[serde(default = "default_true")]
    pub auto_connect: bool,
    /// Number of output addresses this plugin publishes on (default: 1)
    #[serde(default = "default_max_addr")]
    pub max_addr: usize,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            array_port: String::new(),
            array_addr: 0,
            queue_size: default_queue_size(),
            blocking_callbacks: false,
            enable_callbacks: false,
            num_threads: default_num_threads(),
            max_threads: default_max_threads(),
            min_callback_time: 0.0,
            dequeue_timeout_ms: default_dequeue_timeout_ms(),
            thread_stack_size: None,
            auto_connect: true,
            max_addr: default_max_addr(),
        }
    }
}

impl PluginConfig {
    /// Configuration for a plugin named `name` reading from `array_port`, address 0.
    pub fn new(name: impl Into<String>, array_port: impl Into<String>) -> Self {
        Self { name: name.into(), array_port: array_port.into(), ..Self::default() }
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms.max(1))
    }

    /// Checks values that cannot be clamped into range.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Configuration` for an empty name, a queue size outside
    /// `1..=MAX_QUEUE_SIZE`, a zero thread maximum, or an invalid `min_callback_time`.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(NdKitError::Configuration("plugin name must not be empty".into()));
        }
        validate_queue_size(&self.name, self.queue_size)?;
        if self.max_threads == 0 {
            return Err(NdKitError::Configuration(format!(
                "{}: max_threads must be at least 1",
                self.name
            )));
        }
        crate::throttle::min_interval_from_secs(self.min_callback_time)?;
        Ok(())
    }
}

/// Queue capacity must be in `1..=MAX_QUEUE_SIZE`.
pub(crate) fn validate_queue_size(plugin: &str, capacity: usize) -> Result<()> {
    if (1..=MAX_QUEUE_SIZE).contains(&capacity) {
        Ok(())
    } else {
        Err(NdKitError::Configuration(format!(
            "{plugin}: queue_size must be between 1 and {MAX_QUEUE_SIZE}, got {capacity}"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: PluginConfig =
            serde_json::from_value(serde_json::json!({ "name": "STATS1", "array_port": "SIM1" }))
                .unwrap();
        assert_eq!(config.queue_size, DEFAULT_QUEUE_SIZE);
        assert_eq!(config.num_threads, DEFAULT_NUM_THREADS);
        assert!(config.auto_connect);
        assert!(!config.enable_callbacks);
        assert_eq!(config.dequeue_timeout(), DEFAULT_DEQUEUE_TIMEOUT);
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = PluginConfig::new("STATS1", "SIM1");
        config.queue_size = 0;
        assert!(config.validate().is_err());
        config.queue_size = usize::MAX;
        assert!(matches!(config.validate(), Err(NdKitError::Configuration(_))));
        config.queue_size = MAX_QUEUE_SIZE;
        config.validate().unwrap();

        let mut config = PluginConfig::new("STATS1", "SIM1");
        config.min_callback_time = -1.0;
        assert!(config.validate().is_err());

        let config = PluginConfig::new("  ", "SIM1");
        assert!(config.validate().is_err());
    }
}
