// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! engine: Plugin drivers for ndkit.
//!
//! A [`PluginDriver`] sits between an upstream array port and a plugin's
//! [`ArrayProcessor`]. For every array it decides, on the producer's thread, whether
//! to skip it (callbacks disabled or throttled), process it right there (blocking
//! mode, or no worker threads), or hand it to a worker pool through a bounded queue,
//! dropping it when the queue is full. The producer never waits in queued mode.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ndkit_core::PortRegistry;
//! use ndkit_engine::{FnProcessor, PluginConfig, PluginDriver, SimDetector, SimDetectorConfig};
//!
//! # fn main() -> ndkit_core::Result<()> {
//! let registry = PortRegistry::new();
//! let sim = Arc::new(SimDetector::new(SimDetectorConfig::default())?);
//! registry.register(sim.clone())?;
//!
//! let mut config = PluginConfig::new("STATS1", "SIM1");
//! config.enable_callbacks = true;
//! let stats = PluginDriver::start(
//!     config,
//!     Arc::new(FnProcessor::new("NDPluginStats", |array, _ctx| {
//!         let _mean = array.to_f64_vec().iter().sum::<f64>();
//!         Ok(())
//!     })),
//!     &registry,
//! )?;
//!
//! sim.acquire(10)?;
//! println!("{:?}", stats.stats());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod driver;
pub mod link;
mod metrics;
pub mod pool;
pub mod processor;
pub mod queue;
pub mod sim_detector;
pub mod throttle;

pub use config::PluginConfig;
pub use driver::PluginDriver;
pub use link::UpstreamLink;
pub use pool::{WorkHandler, WorkerPool};
pub use processor::{ArrayProcessor, FnProcessor, ProcessContext};
pub use queue::{Dequeued, Enqueue, HandoffQueue};
pub use sim_detector::{ramp_frame, SimDetector, SimDetectorConfig};
pub use throttle::Throttle;

#[cfg(test)]
mod tests;
