// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Built-in processing routines selectable from the config file.

use ndkit_core::{config_helpers, NDArray, NDAttribute, NdKitError, Result, SharedArray};
use ndkit_engine::{ArrayProcessor, ProcessContext};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    /// Republishes every array unchanged on output address 0
    Passthrough,
    /// Sleeps for a fixed time per array, simulating an expensive plugin
    Sleep,
    /// Computes min, max, mean and total of each array
    Stats,
}

impl ProcessorKind {
    /// Builds the processing routine, parsing `params` into its parameter type.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Configuration` if `params` does not match the routine's
    /// parameters.
    pub fn build(self, params: Option<&serde_json::Value>) -> Result<Arc<dyn ArrayProcessor>> {
        let processor: Arc<dyn ArrayProcessor> = match self {
            Self::Passthrough => Arc::new(Passthrough),
            Self::Sleep => Arc::new(Sleep::new(config_helpers::parse_config_optional(params)?)),
            Self::Stats => Arc::new(Stats::new(config_helpers::parse_config_optional(params)?)),
        };
        Ok(processor)
    }
}

pub struct Passthrough;

impl ArrayProcessor for Passthrough {
    fn plugin_type(&self) -> &str {
        "Passthrough"
    }

    fn process(&self, array: &SharedArray, ctx: &ProcessContext<'_>) -> Result<()> {
        ctx.publish(array);
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(default)]
pub struct SleepConfig {
    /// Time spent on each array, in milliseconds (default: 10)
    pub millis: u64,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self { millis: 10 }
    }
}

pub struct Sleep {
    delay: Duration,
}

impl Sleep {
    pub const fn new(config: SleepConfig) -> Self {
        Self { delay: Duration::from_millis(config.millis) }
    }
}

impl ArrayProcessor for Sleep {
    fn plugin_type(&self) -> &str {
        "Sleep"
    }

    fn process(&self, _array: &SharedArray, _ctx: &ProcessContext<'_>) -> Result<()> {
        std::thread::sleep(self.delay);
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(default)]
pub struct StatsConfig {
    /// Publish `[min, max, mean, total]` as a Float64 array for downstream plugins
    pub publish: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { publish: true }
    }
}

/// Summary statistics of one array's elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrayStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub total: f64,
}

impl ArrayStats {
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(values: &[f64]) -> Option<Self> {
        let (&first, rest) = values.split_first()?;
        let (min, max, total) = rest.iter().fold((first, first, first), |(min, max, total), &v| {
            (min.min(v), max.max(v), total + v)
        });
        Some(Self { min, max, mean: total / values.len() as f64, total })
    }
}

pub struct Stats {
    config: StatsConfig,
}

impl Stats {
    pub const fn new(config: StatsConfig) -> Self {
        Self { config }
    }
}

impl ArrayProcessor for Stats {
    fn plugin_type(&self) -> &str {
        "Stats"
    }

    fn process(&self, array: &SharedArray, ctx: &ProcessContext<'_>) -> Result<()> {
        let stats = ArrayStats::compute(&array.to_f64_vec())
            .ok_or_else(|| NdKitError::Processing("array has no elements".into()))?;
        tracing::debug!(
            plugin = %ctx.plugin_name(),
            unique_id = array.unique_id(),
            min = stats.min,
            max = stats.max,
            mean = stats.mean,
            "Computed array statistics"
        );

        if self.config.publish {
            let values = [stats.min, stats.max, stats.mean, stats.total];
            let derived = NDArray::from_elements(&[values.len()], &values)?
                .with_unique_id(array.unique_id())
                .with_timestamp(array.timestamp())
                .with_attribute(NDAttribute::new("SourcePlugin", ctx.plugin_name()))
                .with_attribute(NDAttribute::new("MeanValue", stats.mean))
                .into_shared();
            ctx.publish(&derived);
        }
        Ok(())
    }
}
