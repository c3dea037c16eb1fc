// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::{LogConfig, LogFormat, LogLevel};

type DynLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// `RUST_LOG` wins over the configured level when it is set and valid.
fn filter_for(level: &LogLevel) -> EnvFilter {
    let level: tracing::Level = level.clone().into();
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Worker threads are named after their plugin, so thread names are always shown.
fn console_layer(level: &LogLevel) -> DynLayer {
    tracing_subscriber::fmt::layer().with_thread_names(true).with_filter(filter_for(level)).boxed()
}

fn file_layer(
    log_config: &LogConfig,
) -> Result<(DynLayer, WorkerGuard), Box<dyn std::error::Error>> {
    let path = Path::new(&log_config.file_path);
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let Some(file_name) = path.file_name() else {
        return Err(format!("Log file path {} has no file name", path.display()).into());
    };
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create log directory {}: {e}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    let fmt = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
    let layer = match log_config.file_format {
        LogFormat::Json => fmt.json().with_filter(filter_for(&log_config.file_level)).boxed(),
        LogFormat::Text => {
            fmt.with_thread_names(true).with_filter(filter_for(&log_config.file_level)).boxed()
        },
    };
    Ok((layer, guard))
}

/// Initialize logging based on configuration
///
/// Installs a console layer and/or a non-blocking file layer. When both are
/// disabled, console logging at info level is used anyway.
///
/// # Errors
///
/// Returns an error if file logging is enabled but the log directory cannot be
/// created or the path has no file name.
pub fn init_logging(
    log_config: &LogConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let mut layers: Vec<DynLayer> = Vec::new();
    let mut guard = None;

    if log_config.file_enable {
        let (layer, file_guard) = file_layer(log_config)?;
        layers.push(layer);
        guard = Some(file_guard);
    }

    let fallback = !log_config.console_enable && !log_config.file_enable;
    if log_config.console_enable || fallback {
        let level = if fallback { LogLevel::Info } else { log_config.console_level.clone() };
        layers.push(console_layer(&level));
    }

    tracing_subscriber::registry().with(layers).init();

    if fallback {
        tracing::warn!(
            "Both console and file logging are disabled, falling back to console logging"
        );
    }

    Ok(guard)
}
