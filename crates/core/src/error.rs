// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for ndkit.
//!
//! Only connection and configuration failures are surfaced to the caller of a
//! control operation. Queue-full drops and throttle skips are not errors at all
//! (see [`crate::control::Delivery`]), and processing failures are contained at the
//! worker boundary and only show up in the counters.

use thiserror::Error;

/// Main error type for ndkit operations.
#[derive(Debug, Error)]
pub enum NdKitError {
    /// The upstream array port does not exist or cannot serve the requested address.
    ///
    /// The link that attempted the connection stays disconnected.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid control value or array shape.
    ///
    /// Examples:
    /// - Negative or non-finite minimum callback time
    /// - Queue size of zero
    /// - Payload length that does not match the declared dimensions
    ///
    /// The previous configuration is retained.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failure raised by a plugin's processing routine for a single array.
    #[error("Processing error: {0}")]
    Processing(String),

    /// Internal runtime failure (thread spawn, no array to reprocess, ...).
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using `NdKitError`.
pub type Result<T> = std::result::Result<T, NdKitError>;

impl From<NdKitError> for String {
    fn from(err: NdKitError) -> Self {
        err.to_string()
    }
}

// Plain strings default to processing errors, which is what plugin routines
// usually mean when they bail with `Err("...".into())`.
impl From<String> for NdKitError {
    fn from(s: String) -> Self {
        Self::Processing(s)
    }
}

impl From<&str> for NdKitError {
    fn from(s: &str) -> Self {
        Self::Processing(s.to_string())
    }
}
