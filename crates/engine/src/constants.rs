// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared defaults for plugin drivers.
//!
//! Plugin configuration, the app config and the tests all reference these constants
//! so the defaults stay consistent across the codebase.
//!
//! # Queue sizing
//!
//! Queue capacity is measured in arrays (not bytes). Each queued array keeps its
//! payload alive, so a 16-deep queue of 2048x2048 UInt16 frames pins ~128 MiB.
//!
//! - **Larger queue** = absorbs longer bursts before dropping, more memory held
//! - **Smaller queue** = drops sooner, bounded memory and latency

use std::time::Duration;

/// Default capacity of a plugin's handoff queue.
pub const DEFAULT_QUEUE_SIZE: usize = 16;

/// Largest accepted handoff queue capacity. Queue slots are allocated up front.
pub const MAX_QUEUE_SIZE: usize = 65_536;

/// Default number of worker threads.
pub const DEFAULT_NUM_THREADS: usize = 1;

/// Default upper bound for the worker thread count.
///
/// `SetNumThreads` values above the plugin's maximum are clamped to it.
pub const DEFAULT_MAX_THREADS: usize = 4;

/// How long a worker waits on an empty queue before re-checking for a stop request.
///
/// Stop sentinels wake blocked workers immediately; this timeout only bounds how
/// long a worker can miss a stop flag when the sentinel could not be queued.
pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// Number of output addresses a plugin publishes derived arrays on.
pub const DEFAULT_OUTPUT_ADDRESSES: usize = 1;

/// How long `start` waits for every worker to report that it is running.
pub const WORKER_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default buffer size for stats/state subscriber channels.
pub const DEFAULT_MONITOR_CAPACITY: usize = 64;
