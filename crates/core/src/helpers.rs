// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Utility functions for plugin configuration.
//!
//! - [`config_helpers`]: Parse processor parameters from JSON values

/// Helper functions for parsing processor parameters from JSON values.
pub mod config_helpers {
    use crate::error::NdKitError;
    use serde::Deserialize;

    /// Parses parameters from an optional JSON value, using defaults if not provided.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Configuration` if `params` is present but does not match `T`.
    pub fn parse_config_optional<T>(params: Option<&serde_json::Value>) -> Result<T, NdKitError>
    where
        T: for<'de> Deserialize<'de> + Default,
    {
        match params {
            None | Some(serde_json::Value::Null) => Ok(T::default()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                NdKitError::Configuration(format!("Failed to parse parameters: {e}"))
            }),
        }
    }

    /// Parses parameters from an optional JSON value, returning an error if not provided.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Configuration` if `params` is `None` or if deserialization fails.
    pub fn parse_config_required<T>(params: Option<&serde_json::Value>) -> Result<T, NdKitError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let value = params
            .ok_or_else(|| NdKitError::Configuration("Parameters required".to_string()))?
            .clone();
        serde_json::from_value(value)
            .map_err(|e| NdKitError::Configuration(format!("Failed to parse parameters: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::config_helpers::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct SleepParams {
        millis: u64,
    }

    #[test]
    fn optional_uses_default_when_missing() {
        let params: SleepParams = parse_config_optional(None).unwrap();
        assert_eq!(params, SleepParams::default());

        let value = serde_json::json!({ "millis": 25 });
        let params: SleepParams = parse_config_optional(Some(&value)).unwrap();
        assert_eq!(params.millis, 25);
    }

    #[test]
    fn optional_rejects_wrong_shape() {
        let value = serde_json::json!({ "millis": "soon" });
        assert!(parse_config_optional::<SleepParams>(Some(&value)).is_err());
    }

    #[test]
    fn required_errors_when_missing() {
        assert!(parse_config_required::<SleepParams>(None).is_err());
    }
}
