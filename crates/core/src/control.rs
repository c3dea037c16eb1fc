// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Control messages and delivery outcomes for plugins.
//!
//! - [`PluginControlMessage`]: runtime writes to a plugin's control surface
//! - [`Delivery`]: what happened to one array handed to a plugin

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A write to a running plugin's control surface.
///
/// Each variant maps to one writable plugin parameter. Messages are applied in order
/// and either take effect for the next array or are rejected with the previous value
/// retained.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum PluginControlMessage {
    /// Register (true) or deregister (false) for upstream array callbacks.
    SetEnableCallbacks(bool),
    /// Process arrays on the producer's thread instead of the worker pool.
    SetBlockingCallbacks(bool),
    /// Resize the worker pool. Values above the plugin's maximum are clamped.
    SetNumThreads(usize),
    /// Minimum time in seconds between processed arrays. 0 disables throttling.
    SetMinCallbackTime(f64),
    /// Switch to a different upstream port, keeping the address.
    SetArrayPort(String),
    /// Switch to a different address on the current upstream port.
    SetArrayAddr(usize),
    /// Rebuild the handoff queue with a new capacity.
    SetQueueSize(usize),
    /// Overwrite the dropped-array counter (usually to reset it to 0).
    SetDroppedArrays(u64),
    /// Overwrite the array counter.
    SetArrayCounter(u64),
    /// Run the most recently received array through the plugin again.
    ProcessPlugin,
}

/// Outcome of handing one array to a plugin.
///
/// None of these is an error: drops and throttle skips are expected, accounted
/// outcomes that only show up in the plugin's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Callbacks are disabled; the array was released untouched.
    Disabled,
    /// The array arrived before `min_callback_time` elapsed and was skipped.
    Throttled,
    /// The array was processed synchronously on the calling thread.
    Processed,
    /// The array was placed on the handoff queue for the worker pool.
    Queued,
    /// The handoff queue was full; the array was released and counted as dropped.
    Dropped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_messages_roundtrip_through_json() {
        let Ok(msg) = serde_json::from_str::<PluginControlMessage>(
            r#"{ "type": "set_num_threads", "value": 4 }"#,
        ) else {
            panic!("control message should parse");
        };
        assert_eq!(msg, PluginControlMessage::SetNumThreads(4));

        let Ok(msg) = serde_json::from_str::<PluginControlMessage>(r#"{ "type": "process_plugin" }"#)
        else {
            panic!("unit control message should parse");
        };
        assert_eq!(msg, PluginControlMessage::ProcessPlugin);
    }
}
