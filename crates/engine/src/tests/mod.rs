// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Unit tests for the engine crate.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod driver_delivery;

use crate::{ArrayProcessor, PluginConfig, ProcessContext};
use ndkit_core::{ArrayPublisher, NDArray, NDDataType, PortRegistry, Result, SharedArray};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub(super) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub(super) fn frame(id: u64) -> SharedArray {
    NDArray::zeros(&[8, 8], NDDataType::UInt16).unwrap().with_unique_id(id).into_shared()
}

/// Registry holding a two-address upstream port named `SIM1`.
pub(super) fn upstream() -> (PortRegistry, Arc<ArrayPublisher>) {
    let registry = PortRegistry::new();
    let sim = Arc::new(ArrayPublisher::new("SIM1", 2));
    registry.register(sim.clone()).unwrap();
    (registry, sim)
}

pub(super) fn enabled_config(name: &str) -> PluginConfig {
    let mut config = PluginConfig::new(name, "SIM1");
    config.enable_callbacks = true;
    config
}

pub(super) fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Records the unique id of every array it sees, optionally sleeping first.
pub(super) struct Recorder {
    pub delay: Duration,
    pub seen: Mutex<Vec<u64>>,
    /// Signalled when processing of an array begins.
    pub started: Option<crossbeam_channel::Sender<u64>>,
}

impl Recorder {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay, seen: Mutex::new(Vec::new()), started: None })
    }

    pub fn with_start_signal(delay: Duration) -> (Arc<Self>, crossbeam_channel::Receiver<u64>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Arc::new(Self { delay, seen: Mutex::new(Vec::new()), started: Some(tx) }), rx)
    }

    pub fn seen(&self) -> Vec<u64> {
        self.seen.lock().unwrap().clone()
    }
}

impl ArrayProcessor for Recorder {
    fn plugin_type(&self) -> &str {
        "Recorder"
    }

    fn process(&self, array: &SharedArray, _ctx: &ProcessContext<'_>) -> Result<()> {
        if let Some(started) = &self.started {
            let _ = started.send(array.unique_id());
        }
        std::thread::sleep(self.delay);
        self.seen.lock().unwrap().push(array.unique_id());
        Ok(())
    }
}
