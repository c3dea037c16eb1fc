// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Worker pool and upstream link state tracking.
//!
//! ## Pool state machine
//!
//! ```text
//!     Stopped ──start──▶ Starting ──all workers ready──▶ Running
//!        ▲                                                  │
//!        └──────────── all workers joined ◀── Stopping ◀─stop┘
//! ```
//!
//! A pool is only ever observed with zero running threads (`Stopped`) or with its
//! full configured count (`Running`); `Starting` and `Stopping` are transitions
//! reported for monitoring.
//!
//! ## Link state machine
//!
//! `Disconnected ⇄ Connected`. Retargeting always passes through `Disconnected`.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Lifecycle of a plugin's worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PoolState {
    /// No worker threads exist.
    Stopped,
    /// Threads are being spawned; `threads` is the target count.
    Starting { threads: usize },
    /// Every configured worker is running.
    Running { threads: usize },
    /// Workers have been asked to exit and are being joined.
    Stopping,
}

impl PoolState {
    pub const fn running_threads(self) -> usize {
        match self {
            Self::Running { threads } => threads,
            Self::Stopped | Self::Starting { .. } | Self::Stopping => 0,
        }
    }
}

/// Connection of a plugin to its upstream port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum LinkState {
    Disconnected,
    Connected { port: String, addr: usize },
}

/// What changed in a [`PluginStateUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateChange {
    Pool(PoolState),
    Link(LinkState),
}

/// A state update message sent by a plugin for monitoring.
#[derive(Debug, Clone)]
pub struct PluginStateUpdate {
    /// Name of the plugin reporting the change
    pub plugin: String,
    pub change: StateChange,
    /// When this state change occurred
    pub timestamp: SystemTime,
}

impl PluginStateUpdate {
    /// Creates a new state update with the current timestamp.
    #[inline]
    pub fn new(plugin: String, change: StateChange) -> Self {
        Self { plugin, change, timestamp: SystemTime::now() }
    }
}

/// Helper functions for emitting plugin state updates.
/// Failures are silently ignored as state tracking is best-effort.
pub mod state_helpers {
    use super::{LinkState, PluginStateUpdate, PoolState, StateChange};
    use tokio::sync::mpsc;

    #[inline]
    pub fn emit_pool(
        state_tx: Option<&mpsc::Sender<PluginStateUpdate>>,
        plugin: &str,
        state: PoolState,
    ) {
        emit(state_tx, plugin, StateChange::Pool(state));
    }

    #[inline]
    pub fn emit_link(
        state_tx: Option<&mpsc::Sender<PluginStateUpdate>>,
        plugin: &str,
        state: LinkState,
    ) {
        emit(state_tx, plugin, StateChange::Link(state));
    }

    #[inline]
    fn emit(state_tx: Option<&mpsc::Sender<PluginStateUpdate>>, plugin: &str, change: StateChange) {
        if let Some(tx) = state_tx {
            let _ = tx.try_send(PluginStateUpdate::new(plugin.to_string(), change));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_running_reports_threads() {
        assert_eq!(PoolState::Running { threads: 3 }.running_threads(), 3);
        assert_eq!(PoolState::Starting { threads: 3 }.running_threads(), 0);
        assert_eq!(PoolState::Stopping.running_threads(), 0);
    }

    #[test]
    fn state_serializes_tagged() {
        let Ok(json) = serde_json::to_value(PoolState::Running { threads: 2 }) else {
            panic!("PoolState should serialize");
        };
        assert_eq!(json, serde_json::json!({ "state": "running", "threads": 2 }));
    }
}
