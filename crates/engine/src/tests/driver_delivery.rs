// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Delivery decisions: disabled, throttled, blocking, queued and dropped arrays.

use super::{enabled_config, frame, init_tracing, upstream, wait_for, Recorder};
use crate::{FnProcessor, PluginDriver};
use ndkit_core::{Delivery, NdKitError, PoolState};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn disabled_plugin_touches_nothing() {
    let (registry, sim) = upstream();
    let recorder = Recorder::new(Duration::ZERO);
    let driver = PluginDriver::start(
        crate::PluginConfig::new("STATS1", "SIM1"),
        recorder.clone(),
        &registry,
    )
    .unwrap();

    assert_eq!(sim.subscriber_count(), 0);
    assert_eq!(driver.driver_callback(frame(1)), Delivery::Disabled);

    let stats = driver.stats();
    assert_eq!(stats.array_counter, 0);
    assert_eq!(stats.dropped_arrays, 0);
    assert_eq!(stats.throttled, 0);
    assert!(!stats.connected);
    assert!(recorder.seen().is_empty());
}

#[test]
fn blocking_mode_processes_before_returning() {
    init_tracing();
    let (registry, sim) = upstream();
    let recorder = Recorder::new(Duration::from_millis(20));
    let mut config = enabled_config("STATS1");
    config.blocking_callbacks = true;
    config.queue_size = 1;
    let driver = PluginDriver::start(config, recorder.clone(), &registry).unwrap();

    for id in 1..=5 {
        let started = Instant::now();
        assert_eq!(sim.publish(0, &frame(id)), 1);
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(recorder.seen().len(), usize::try_from(id).unwrap());
    }

    let stats = driver.stats();
    assert_eq!(stats.array_counter, 5);
    assert_eq!(stats.dropped_arrays, 0);
    assert_eq!(recorder.seen(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn zero_threads_processes_on_the_producer_thread() {
    let (registry, _sim) = upstream();
    let producer = std::thread::current().id();
    let mut config = enabled_config("STATS1");
    config.num_threads = 0;
    let driver = PluginDriver::start(
        config,
        Arc::new(FnProcessor::new("ThreadCheck", move |_array, _ctx| {
            if std::thread::current().id() == producer {
                Ok(())
            } else {
                Err(NdKitError::Processing("ran on another thread".into()))
            }
        })),
        &registry,
    )
    .unwrap();

    assert_eq!(driver.pool_state(), PoolState::Stopped);
    assert_eq!(driver.driver_callback(frame(1)), Delivery::Processed);
    assert_eq!(driver.stats().processing_faults, 0);
    assert_eq!(driver.stats().num_threads, 0);
}

#[test]
fn queued_mode_never_waits_for_processing() {
    let (registry, _sim) = upstream();
    let recorder = Recorder::new(Duration::from_millis(200));
    let mut config = enabled_config("STATS1");
    config.queue_size = 4;
    let driver = PluginDriver::start(config, recorder, &registry).unwrap();

    let mut queued = 0;
    let mut dropped = 0;
    for id in 1..=10 {
        let started = Instant::now();
        match driver.driver_callback(frame(id)) {
            Delivery::Queued => queued += 1,
            Delivery::Dropped => dropped += 1,
            other => panic!("unexpected delivery {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_millis(50));
    }
    assert_eq!(queued + dropped, 10);
    assert!(dropped >= 5);
    assert_eq!(driver.stats().dropped_arrays, dropped);
}

#[test]
fn full_queue_drops_exactly_the_overflow() {
    init_tracing();
    let (registry, _sim) = upstream();
    let (recorder, started) = Recorder::with_start_signal(Duration::from_millis(100));
    let mut config = enabled_config("STATS1");
    config.queue_size = 2;
    config.num_threads = 1;
    let driver = PluginDriver::start(config, recorder.clone(), &registry).unwrap();

    assert_eq!(driver.driver_callback(frame(1)), Delivery::Queued);
    // The worker has pulled the first array, so the queue is empty again.
    assert_eq!(started.recv_timeout(Duration::from_secs(5)).unwrap(), 1);

    let outcomes: Vec<Delivery> = (2..=5).map(|id| driver.driver_callback(frame(id))).collect();
    assert_eq!(
        outcomes,
        vec![Delivery::Queued, Delivery::Queued, Delivery::Dropped, Delivery::Dropped]
    );
    assert_eq!(driver.stats().queue_free, 0);

    wait_for("queued arrays to finish", || recorder.seen().len() == 3);
    let stats = driver.stats();
    assert_eq!(stats.dropped_arrays, 2);
    assert_eq!(stats.queue_free, 2);
    assert_eq!(recorder.seen(), vec![1, 2, 3]);
}

#[test]
fn resize_in_progress_does_not_fill_the_queue() {
    init_tracing();
    let (registry, _sim) = upstream();
    let (recorder, started) = Recorder::with_start_signal(Duration::from_millis(300));
    let mut config = enabled_config("STATS1");
    config.queue_size = 1;
    let driver = PluginDriver::start(config, recorder.clone(), &registry).unwrap();

    assert_eq!(driver.driver_callback(frame(1)), Delivery::Queued);
    assert_eq!(started.recv_timeout(Duration::from_secs(5)).unwrap(), 1);

    // The resize waits for the busy worker while its stop request is pending.
    let resizing = Arc::clone(&driver);
    let resize = std::thread::spawn(move || resizing.set_num_threads(2));
    std::thread::sleep(Duration::from_millis(50));

    assert_eq!(driver.stats().queue_free, 1);
    assert_eq!(driver.driver_callback(frame(2)), Delivery::Queued);
    assert_eq!(driver.stats().dropped_arrays, 0);

    resize.join().unwrap().unwrap();
    wait_for("both arrays", || recorder.seen().len() == 2);
    assert_eq!(recorder.seen(), vec![1, 2]);
    assert_eq!(driver.stats().num_threads, 2);
    assert_eq!(driver.stats().dropped_arrays, 0);
}

#[test]
fn throttle_skips_are_not_drops() {
    let (registry, sim) = upstream();
    let recorder = Recorder::new(Duration::ZERO);
    let mut config = enabled_config("STATS1");
    config.blocking_callbacks = true;
    config.min_callback_time = 0.2;
    let driver = PluginDriver::start(config, recorder.clone(), &registry).unwrap();

    assert_eq!(driver.driver_callback(frame(1)), Delivery::Processed);
    assert_eq!(driver.driver_callback(frame(2)), Delivery::Throttled);
    std::thread::sleep(Duration::from_millis(250));
    sim.publish(0, &frame(3));

    let stats = driver.stats();
    assert_eq!(stats.throttled, 1);
    assert_eq!(stats.dropped_arrays, 0);
    assert!((stats.min_callback_time - 0.2).abs() < 1e-9);
    assert_eq!(recorder.seen(), vec![1, 3]);
}

#[test]
fn faults_are_contained_per_array() {
    init_tracing();
    let (registry, _sim) = upstream();
    let mut config = enabled_config("FAULTY");
    config.queue_size = 16;
    let ok = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let ok_count = Arc::clone(&ok);
    let driver = PluginDriver::start(
        config,
        Arc::new(FnProcessor::new("Faulty", move |array, _ctx| {
            match array.unique_id() {
                2 => Err("bad frame".into()),
                3 => panic!("routine blew up"),
                _ => {
                    ok_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(())
                },
            }
        })),
        &registry,
    )
    .unwrap();

    for id in 1..=5 {
        assert_eq!(driver.driver_callback(frame(id)), Delivery::Queued);
    }
    wait_for("all arrays processed", || {
        driver.stats().processing_faults == 2
            && ok.load(std::sync::atomic::Ordering::SeqCst) == 3
    });

    let stats = driver.stats();
    assert_eq!(stats.array_counter, 5);
    assert_eq!(driver.pool_state(), PoolState::Running { threads: 1 });
}

#[test]
fn resize_under_load_loses_nothing() {
    init_tracing();
    let (registry, sim) = upstream();
    let recorder = Recorder::new(Duration::from_millis(2));
    let mut config = enabled_config("STATS1");
    config.queue_size = 8;
    config.num_threads = 1;
    let driver = PluginDriver::start(config, recorder.clone(), &registry).unwrap();

    let producer_sim = Arc::clone(&sim);
    let producer = std::thread::spawn(move || {
        let mut weak = Vec::new();
        for id in 1..=200 {
            let array = frame(id);
            weak.push(Arc::downgrade(&array));
            producer_sim.publish(0, &array);
            if id % 10 == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        weak
    });

    for threads in [3, 2, 0, 4, 1] {
        driver.set_num_threads(threads).unwrap();
        assert_eq!(driver.stats().num_threads, threads);
        std::thread::sleep(Duration::from_millis(10));
    }

    let weak = producer.join().unwrap();
    driver.shutdown();

    let stats = driver.stats();
    assert_eq!(stats.array_counter + stats.dropped_arrays, 200);

    let seen = recorder.seen();
    let unique: HashSet<u64> = seen.iter().copied().collect();
    assert_eq!(unique.len(), seen.len(), "an array was processed twice");
    assert_eq!(seen.len() as u64, stats.array_counter);

    assert!(weak.iter().all(|w| w.upgrade().is_none()), "an array outlived the driver");
}
