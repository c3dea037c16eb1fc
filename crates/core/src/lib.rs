// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! ndkit Core - Fundamental types for detector array plugins.
//!
//! This crate defines the data and boundary types shared by array producers and
//! plugins:
//!
//! ## Core Modules
//!
//! - [`array`]: Immutable, reference-counted N-dimensional arrays (`NDArray`)
//! - [`port`]: Upstream ports, callback registration and name lookup
//! - [`control`]: Control messages and delivery outcomes
//! - [`state`]: Worker pool and upstream link state machines
//! - [`stats`]: Plugin counters and throttled reporting
//! - [`error`]: Error types and handling
//! - [`helpers`]: Utility functions for parsing processor parameters
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use ndkit_core::{ArrayPort, ArrayPublisher, NDArray, NDDataType};
//!
//! let detector = ArrayPublisher::new("SIM1", 1);
//! detector
//!     .register_callback(0, Arc::new(|array| println!("got array {}", array.unique_id())))
//!     .unwrap();
//!
//! let frame = NDArray::zeros(&[64, 64], NDDataType::UInt16).unwrap().with_unique_id(1);
//! detector.publish(0, &frame.into_shared());
//! ```

pub mod array;
pub mod control;
pub mod error;
pub mod helpers;
pub mod port;
pub mod state;
pub mod stats;

// Error handling
pub use error::{NdKitError, Result};

// Arrays
pub use array::{
    NDArray, NDArrayInfo, NDAttribute, NDDataType, NDDimension, NDElement, SharedArray,
};

// Upstream ports
pub use port::{ArrayCallback, ArrayPort, ArrayPublisher, PortRegistry, SubscriptionId};

// Control surface
pub use control::{Delivery, PluginControlMessage};

// State tracking
pub use state::{state_helpers, LinkState, PluginStateUpdate, PoolState, StateChange};

// Statistics
pub use stats::{PluginStats, PluginStatsTracker, PluginStatsUpdate};

pub use helpers::config_helpers;
