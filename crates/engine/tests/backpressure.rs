// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Integration tests for producer/plugin backpressure.
//!
//! A fast simulated detector feeds plugins slower than itself. Queued plugins must
//! shed load without ever stalling the producer, blocking plugins must stall it
//! without ever dropping, and nothing may deadlock along the way.

#![allow(clippy::expect_used)]

use ndkit_core::PortRegistry;
use ndkit_engine::{
    ArrayProcessor, FnProcessor, PluginConfig, PluginDriver, SimDetector, SimDetectorConfig,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

const FRAMES: u64 = 200;

fn slow_processor(delay: Duration) -> Arc<dyn ArrayProcessor> {
    Arc::new(FnProcessor::new("Slow", move |_array, _ctx| {
        std::thread::sleep(delay);
        Ok(())
    }))
}

fn detector(registry: &PortRegistry) -> Arc<SimDetector> {
    let sim = Arc::new(
        SimDetector::new(SimDetectorConfig {
            size_x: 64,
            size_y: 64,
            frame_rate: 0.0,
            frame_count: Some(FRAMES),
            ..SimDetectorConfig::default()
        })
        .expect("valid detector config"),
    );
    registry.register(sim.clone()).expect("unique port name");
    sim
}

fn plugin_config(name: &str, blocking: bool) -> PluginConfig {
    let mut config = PluginConfig::new(name, "SIM1");
    config.enable_callbacks = true;
    config.blocking_callbacks = blocking;
    config.queue_size = 4;
    config.num_threads = 1;
    config
}

/// Runs an acquisition to completion on a blocking thread and returns its duration.
async fn run_acquisition(sim: Arc<SimDetector>) -> Duration {
    timeout(
        Duration::from_secs(30),
        tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            sim.start().expect("producer thread should start");
            while sim.is_running() {
                std::thread::sleep(Duration::from_millis(5));
            }
            assert_eq!(sim.stop(), FRAMES);
            started.elapsed()
        }),
    )
    .await
    .expect("acquisition deadlocked")
    .expect("acquisition task panicked")
}

#[tokio::test]
async fn queued_plugin_sheds_load_without_stalling_the_producer() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let registry = PortRegistry::new();
    let sim = detector(&registry);
    let plugin = PluginDriver::start(
        plugin_config("SLOW1", false),
        slow_processor(Duration::from_millis(5)),
        &registry,
    )
    .expect("plugin should start");

    let elapsed = run_acquisition(sim).await;
    // 200 frames at 5 ms each would take a second if the producer waited.
    assert!(elapsed < Duration::from_millis(900), "producer stalled for {elapsed:?}");

    plugin.shutdown();
    let stats = plugin.stats();
    assert!(stats.dropped_arrays > 0, "a slow queued plugin should drop: {stats:?}");
    assert_eq!(stats.array_counter + stats.dropped_arrays, FRAMES);
}

#[tokio::test]
async fn blocking_plugin_never_drops() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let registry = PortRegistry::new();
    let sim = detector(&registry);
    let plugin = PluginDriver::start(
        plugin_config("SLOW1", true),
        slow_processor(Duration::from_millis(1)),
        &registry,
    )
    .expect("plugin should start");

    let elapsed = run_acquisition(sim).await;
    assert!(elapsed >= Duration::from_millis(200), "producer did not wait: {elapsed:?}");

    let stats = plugin.stats();
    assert_eq!(stats.array_counter, FRAMES);
    assert_eq!(stats.dropped_arrays, 0);
    plugin.shutdown();
}

#[tokio::test]
async fn mode_switches_during_acquisition_do_not_deadlock() {
    let registry = PortRegistry::new();
    let sim = detector(&registry);
    let plugin = PluginDriver::start(
        plugin_config("SLOW1", false),
        slow_processor(Duration::from_millis(1)),
        &registry,
    )
    .expect("plugin should start");

    let control = Arc::clone(&plugin);
    let toggler = tokio::task::spawn_blocking(move || {
        for round in 0..20 {
            control.set_blocking_callbacks(round % 2 == 0).expect("toggle blocking");
            control.set_num_threads(round % 4).expect("resize pool");
            std::thread::sleep(Duration::from_millis(2));
        }
    });

    run_acquisition(sim).await;
    timeout(Duration::from_secs(30), toggler)
        .await
        .expect("control thread deadlocked")
        .expect("control thread panicked");

    plugin.shutdown();
    let stats = plugin.stats();
    assert_eq!(stats.array_counter + stats.dropped_arrays, FRAMES);
}
