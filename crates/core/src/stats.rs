// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Plugin statistics tracking and reporting.
//!
//! [`PluginStats`] is the read-only view of a plugin's counters. Plugins can push
//! snapshots to a monitoring channel through [`PluginStatsTracker`], which throttles
//! updates (every second or every 100 arrays) so a fast detector does not flood the
//! receiver.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;

use crate::array::NDArrayInfo;

/// Snapshot of a plugin's configuration and counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginStats {
    /// Free-form plugin type reported by the processing routine
    pub plugin_type: String,
    /// Upstream port name and address the plugin takes arrays from
    pub array_port: String,
    pub array_addr: usize,
    /// Whether the plugin is currently registered for upstream callbacks
    pub connected: bool,
    pub enable_callbacks: bool,
    pub blocking_callbacks: bool,
    /// Arrays that reached the processing routine
    pub array_counter: u64,
    /// Arrays discarded because the queue was full (or drained at teardown)
    pub dropped_arrays: u64,
    /// Arrays skipped because they arrived faster than `min_callback_time`
    pub throttled: u64,
    /// Processing routine failures (errors and panics) that were contained
    pub processing_faults: u64,
    /// Total queue capacity
    pub queue_size: usize,
    /// Free queue slots
    pub queue_free: usize,
    /// Configured worker thread count
    pub num_threads: usize,
    /// Duration of the last processing call, in milliseconds
    pub execution_time_ms: f64,
    /// Minimum time between processed arrays, in seconds
    pub min_callback_time: f64,
    /// Summary of the most recent array handed to the processing routine
    pub last_array: Option<NDArrayInfo>,
}

/// A statistics update message sent by a plugin to report its current counters.
#[derive(Debug, Clone)]
pub struct PluginStatsUpdate {
    /// Name of the plugin reporting the stats
    pub plugin: String,
    /// The current statistics snapshot
    pub stats: PluginStats,
    /// When this snapshot was taken
    pub timestamp: SystemTime,
}

/// Helper for throttling plugin statistics updates.
pub struct PluginStatsTracker {
    plugin: String,
    last_send: Instant,
    since_last_send: u64,
    stats_tx: Option<mpsc::Sender<PluginStatsUpdate>>,
}

impl PluginStatsTracker {
    const SEND_INTERVAL: Duration = Duration::from_secs(1);
    const SEND_ARRAY_THRESHOLD: u64 = 100;

    pub fn new(plugin: String, stats_tx: Option<mpsc::Sender<PluginStatsUpdate>>) -> Self {
        Self { plugin, last_send: Instant::now(), since_last_send: 0, stats_tx }
    }

    pub const fn is_attached(&self) -> bool {
        self.stats_tx.is_some()
    }

    /// Records one processed array and sends a snapshot if the throttle allows it.
    ///
    /// `snapshot` is only evaluated when an update is actually sent.
    pub fn maybe_send(&mut self, snapshot: impl FnOnce() -> PluginStats) {
        if self.stats_tx.is_none() {
            return;
        }
        self.since_last_send += 1;
        if self.since_last_send >= Self::SEND_ARRAY_THRESHOLD
            || self.last_send.elapsed() >= Self::SEND_INTERVAL
        {
            self.force_send(snapshot());
        }
    }

    /// Sends a snapshot immediately (useful for final updates).
    pub fn force_send(&mut self, stats: PluginStats) {
        if let Some(ref stats_tx) = self.stats_tx {
            // Best-effort: a full monitoring channel must never slow the data path.
            let _ = stats_tx.try_send(PluginStatsUpdate {
                plugin: self.plugin.clone(),
                stats,
                timestamp: SystemTime::now(),
            });
            self.last_send = Instant::now();
            self.since_last_send = 0;
        }
    }
}
