// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use ndkit_core::PluginControlMessage;
use ndkit_engine::{PluginConfig, SimDetectorConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::Level;

use crate::processors::ProcessorKind;

/// Log level for filtering messages.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Encoding of the log file.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Where log output goes and how verbose it is. Missing keys take the defaults below.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(default)]
pub struct LogConfig {
    pub console_enable: bool,
    pub console_level: LogLevel,
    pub file_enable: bool,
    pub file_level: LogLevel,
    /// Parent directories are created on startup.
    pub file_path: String,
    pub file_format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enable: true,
            console_level: LogLevel::Info,
            file_enable: false,
            file_level: LogLevel::Debug,
            file_path: "./ndkit.log".to_string(),
            file_format: LogFormat::Text,
        }
    }
}

/// One plugin in the processing chain.
///
/// Plugins are started in the order they appear, so a plugin reading from another
/// plugin's port must come after it.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct PluginEntry {
    /// Which built-in processing routine this plugin runs
    pub processor: ProcessorKind,
    /// Parameters for the processing routine. Defaults apply when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(flatten)]
    pub driver: PluginConfig,
}

/// A control message applied to a running plugin after a delay.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ScheduledControl {
    /// Seconds after acquisition starts
    pub after_secs: f64,
    /// Name of the target plugin
    pub plugin: String,
    pub message: PluginControlMessage,
}

const fn default_stats_interval_ms() -> u64 {
    1000
}

/// How long to acquire for and how often to report.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct RunConfig {
    /// Stop after this many seconds. Without it the run ends when the detector reaches
    /// its `frame_count`, or on Ctrl+C.
    #[serde(default)]
    pub duration_secs: Option<f64>,
    /// Interval between periodic counter summaries, in milliseconds (default: 1000)
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
    #[serde(default)]
    pub controls: Vec<ScheduledControl>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration_secs: None,
            stats_interval_ms: default_stats_interval_ms(),
            controls: Vec::new(),
        }
    }
}

impl RunConfig {
    /// # Errors
    ///
    /// Returns an error if `duration_secs` is negative or not finite.
    pub fn duration(&self) -> Result<Option<Duration>, String> {
        self.duration_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| format!("invalid run.duration_secs {secs}: {e}"))
            })
            .transpose()
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms.max(1))
    }
}

fn default_plugins() -> Vec<PluginEntry> {
    let mut stats = PluginConfig::new("STATS1", "SIM1");
    stats.enable_callbacks = true;
    vec![PluginEntry { processor: ProcessorKind::Stats, params: None, driver: stats }]
}

/// Root configuration for the ndkit runner.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub detector: SimDetectorConfig,

    #[serde(default = "default_plugins")]
    pub plugins: Vec<PluginEntry>,

    #[serde(default)]
    pub run: RunConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            detector: SimDetectorConfig::default(),
            plugins: default_plugins(),
            run: RunConfig::default(),
        }
    }
}

#[derive(Debug)]
pub struct ConfigLoadResult {
    pub config: Config,
    pub file_missing: Option<String>,
}

/// Loads the configuration from defaults, a TOML file, and `NDKIT_` environment variables.
///
/// Nested keys are separated by a double underscore, e.g. `NDKIT_DETECTOR__FRAME_RATE=50`.
///
/// # Errors
///
/// Returns an error if the file exists but is not valid TOML, or if any layer supplies
/// a value of the wrong type.
pub fn load(config_path: &str) -> Result<ConfigLoadResult, Box<figment::Error>> {
    let defaults = Figment::from(figment::providers::Serialized::defaults(Config::default()));
    let (figment, file_missing) = if std::path::Path::new(config_path).is_file() {
        (defaults.merge(Toml::file(config_path)), None)
    } else {
        (defaults, Some(config_path.to_string()))
    };

    let config: Config =
        figment.merge(Env::prefixed("NDKIT_").split("__")).extract().map_err(Box::new)?;

    Ok(ConfigLoadResult { config, file_missing })
}

/// Generates the default configuration as a pretty-printed TOML string.
///
/// # Errors
///
/// Returns an error if the default configuration cannot be serialized to TOML.
pub fn generate_default() -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&Config::default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use ndkit_core::NDDataType;

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = generate_default().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.detector, SimDetectorConfig::default());
        assert_eq!(parsed.plugins.len(), 1);
        assert_eq!(parsed.plugins[0].driver.name, "STATS1");
        assert_eq!(parsed.plugins[0].processor, ProcessorKind::Stats);
        assert!(parsed.plugins[0].driver.enable_callbacks);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        Jail::expect_with(|_jail| {
            let result = load("does-not-exist.toml").map_err(|e| *e)?;
            assert_eq!(result.file_missing.as_deref(), Some("does-not-exist.toml"));
            assert_eq!(result.config.detector.port, "SIM1");
            assert_eq!(result.config.run.stats_interval(), Duration::from_secs(1));
            Ok(())
        });
    }

    #[test]
    fn file_and_environment_layers_apply_in_order() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "ndkit.toml",
                r#"
                [detector]
                size_x = 32
                size_y = 16
                data_type = "float32"
                frame_rate = 5.0

                [[plugins]]
                name = "PASS1"
                array_port = "SIM1"
                enable_callbacks = true
                processor = "passthrough"

                [[plugins]]
                name = "SLOW1"
                array_port = "PASS1"
                enable_callbacks = true
                queue_size = 4
                processor = "sleep"
                params = { millis = 20 }

                [run]
                duration_secs = 2.5

                [[run.controls]]
                after_secs = 1.0
                plugin = "SLOW1"
                message = { type = "set_num_threads", value = 2 }
                "#,
            )?;
            jail.set_env("NDKIT_DETECTOR__FRAME_RATE", "50.0");

            let result = load("ndkit.toml").map_err(|e| *e)?;
            assert!(result.file_missing.is_none());

            let config = result.config;
            assert_eq!(config.detector.size_x, 32);
            assert_eq!(config.detector.data_type, NDDataType::Float32);
            assert!((config.detector.frame_rate - 50.0).abs() < f64::EPSILON);

            assert_eq!(config.plugins.len(), 2);
            let slow = &config.plugins[1];
            assert_eq!(slow.processor, ProcessorKind::Sleep);
            assert_eq!(slow.driver.array_port, "PASS1");
            assert_eq!(slow.driver.queue_size, 4);
            assert_eq!(slow.params, Some(serde_json::json!({ "millis": 20 })));

            assert_eq!(config.run.duration().unwrap(), Some(Duration::from_millis(2500)));
            assert_eq!(config.run.controls.len(), 1);
            assert_eq!(config.run.controls[0].message, PluginControlMessage::SetNumThreads(2));
            Ok(())
        });
    }

    #[test]
    fn negative_duration_is_rejected() {
        let run = RunConfig { duration_secs: Some(-1.0), ..RunConfig::default() };
        assert!(run.duration().is_err());
    }
}
