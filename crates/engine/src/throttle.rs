// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Minimum spacing between processed arrays.

use ndkit_core::{NdKitError, Result};
use std::time::{Duration, Instant};

/// Converts a `min_callback_time` in seconds into an interval.
///
/// # Errors
///
/// Returns `NdKitError::Configuration` for negative, NaN or infinite values.
pub fn min_interval_from_secs(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        NdKitError::Configuration(format!(
            "min_callback_time must be a finite, non-negative number of seconds (got {secs})"
        ))
    })
}

/// Rate limiter keyed on the last accepted invocation.
///
/// The first invocation is always accepted. A zero interval disables throttling.
#[derive(Debug, Clone, Default)]
pub struct Throttle {
    min_interval: Duration,
    last_accepted: Option<Instant>,
}

impl Throttle {
    pub const fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_accepted: None }
    }

    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub const fn set_min_interval(&mut self, min_interval: Duration) {
        self.min_interval = min_interval;
    }

    pub fn should_accept(&self, now: Instant) -> bool {
        if self.min_interval.is_zero() {
            return true;
        }
        self.last_accepted
            .is_none_or(|last| now.saturating_duration_since(last) >= self.min_interval)
    }

    pub const fn record_accepted(&mut self, now: Instant) {
        self.last_accepted = Some(now);
    }

    /// Checks and records in one step. Returns whether `now` was accepted.
    pub fn accept(&mut self, now: Instant) -> bool {
        let accepted = self.should_accept(now);
        if accepted {
            self.record_accepted(now);
        }
        accepted
    }
}
