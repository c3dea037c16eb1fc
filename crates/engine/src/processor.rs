// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The per-array routine a plugin runs, and what it can reach while running.

use ndkit_core::{ArrayPublisher, Result, SharedArray};

/// Context handed to [`ArrayProcessor::process`] for one array.
pub struct ProcessContext<'a> {
    plugin_name: &'a str,
    publisher: &'a ArrayPublisher,
}

impl<'a> ProcessContext<'a> {
    pub(crate) const fn new(plugin_name: &'a str, publisher: &'a ArrayPublisher) -> Self {
        Self { plugin_name, publisher }
    }

    pub const fn plugin_name(&self) -> &str {
        self.plugin_name
    }

    /// Publishes a derived array on output address 0. Returns the number of
    /// downstream callbacks invoked.
    pub fn publish(&self, array: &SharedArray) -> usize {
        self.publisher.publish(0, array)
    }

    pub fn publish_to(&self, addr: usize, array: &SharedArray) -> usize {
        self.publisher.publish(addr, array)
    }
}

/// A plugin's processing routine.
///
/// With more than one worker thread `process` runs concurrently, so implementations
/// keep their own state behind interior mutability. Returning an error (or
/// panicking) counts as a processing fault for that array only.
///
/// `process` must not call control operations on the driver that is running it.
pub trait ArrayProcessor: Send + Sync + 'static {
    /// Reported as `plugin_type` in the plugin's stats.
    fn plugin_type(&self) -> &str;

    /// Processes one array.
    ///
    /// # Errors
    ///
    /// Any error is logged and counted as a processing fault by the driver.
    fn process(&self, array: &SharedArray, ctx: &ProcessContext<'_>) -> Result<()>;
}

/// Adapts a closure into an [`ArrayProcessor`].
pub struct FnProcessor<F> {
    plugin_type: String,
    f: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(&SharedArray, &ProcessContext<'_>) -> Result<()> + Send + Sync + 'static,
{
    pub fn new(plugin_type: impl Into<String>, f: F) -> Self {
        Self { plugin_type: plugin_type.into(), f }
    }
}

impl<F> ArrayProcessor for FnProcessor<F>
where
    F: Fn(&SharedArray, &ProcessContext<'_>) -> Result<()> + Send + Sync + 'static,
{
    fn plugin_type(&self) -> &str {
        &self.plugin_type
    }

    fn process(&self, array: &SharedArray, ctx: &ProcessContext<'_>) -> Result<()> {
        (self.f)(array, ctx)
    }
}
