// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Builds the detector and plugin chain from a [`Config`] and runs an acquisition.

use anyhow::{bail, Context};
use ndkit_core::{PluginStateUpdate, PluginStats, PluginStatsUpdate, PortRegistry};
use ndkit_engine::{constants::DEFAULT_MONITOR_CAPACITY, PluginDriver, SimDetector};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{Config, ScheduledControl};

/// Poll interval for noticing that the detector reached its frame count.
const DETECTOR_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for the monitor task to drain after shutdown.
const MONITOR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub stats: PluginStats,
}

/// Final counters of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub elapsed: Duration,
    pub plugins: Vec<PluginSummary>,
}

impl RunSummary {
    pub fn plugin(&self, name: &str) -> Option<&PluginStats> {
        self.plugins.iter().find(|p| p.name == name).map(|p| &p.stats)
    }
}

/// A detector and the plugins connected to it, registered under their port names.
pub struct Pipeline {
    registry: PortRegistry,
    detector: Arc<SimDetector>,
    plugins: Vec<Arc<PluginDriver>>,
}

impl Pipeline {
    /// Creates the detector and starts every configured plugin in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the detector config is invalid, a processor's parameters
    /// do not parse, a port name is taken twice, or a plugin fails to start.
    pub fn build(
        config: &Config,
        stats_tx: &mpsc::Sender<PluginStatsUpdate>,
        state_tx: &mpsc::Sender<PluginStateUpdate>,
    ) -> anyhow::Result<Self> {
        let registry = PortRegistry::new();
        let detector = Arc::new(
            SimDetector::new(config.detector.clone()).context("invalid detector configuration")?,
        );
        registry.register(detector.clone())?;

        let mut plugins = Vec::with_capacity(config.plugins.len());
        for entry in &config.plugins {
            let name = entry.driver.name.clone();
            let processor = entry
                .processor
                .build(entry.params.as_ref())
                .with_context(|| format!("invalid params for plugin {name}"))?;
            let driver = PluginDriver::start_with_channels(
                entry.driver.clone(),
                processor,
                &registry,
                Some(stats_tx.clone()),
                Some(state_tx.clone()),
            )
            .with_context(|| format!("failed to start plugin {name}"))?;
            registry.register(driver.clone())?;
            plugins.push(driver);
        }

        Ok(Self { registry, detector, plugins })
    }

    pub fn detector(&self) -> &Arc<SimDetector> {
        &self.detector
    }

    pub fn plugin(&self, name: &str) -> Option<&Arc<PluginDriver>> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    fn log_counters(&self) {
        info!(frames = self.detector.frames_published(), "Detector counters");
        for plugin in &self.plugins {
            let stats = plugin.stats();
            info!(
                plugin = %plugin.name(),
                array_counter = stats.array_counter,
                dropped_arrays = stats.dropped_arrays,
                throttled = stats.throttled,
                processing_faults = stats.processing_faults,
                queue_free = stats.queue_free,
                queue_size = stats.queue_size,
                num_threads = stats.num_threads,
                execution_time_ms = stats.execution_time_ms,
                "Plugin counters"
            );
        }
    }

    /// Stops the detector, then shuts plugins down upstream first. Blocks on thread joins.
    fn shutdown(self, started: Instant) -> RunSummary {
        let frames = self.detector.stop();
        let mut plugins = Vec::with_capacity(self.plugins.len());
        for plugin in &self.plugins {
            plugin.shutdown();
            self.registry.unregister(plugin.name());
            plugins.push(PluginSummary { name: plugin.name().to_string(), stats: plugin.stats() });
        }
        self.registry.unregister(&self.detector.config().port);
        RunSummary { frames, elapsed: started.elapsed(), plugins }
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn pending_controls(
    config: &Config,
    pipeline: &Pipeline,
) -> anyhow::Result<VecDeque<ScheduledControl>> {
    let mut controls = config.run.controls.clone();
    for control in &controls {
        if pipeline.plugin(&control.plugin).is_none() {
            bail!("control message targets unknown plugin {}", control.plugin);
        }
        if !control.after_secs.is_finite() || control.after_secs < 0.0 {
            bail!("control for {} has invalid after_secs {}", control.plugin, control.after_secs);
        }
    }
    controls.sort_by(|a, b| a.after_secs.total_cmp(&b.after_secs));
    Ok(controls.into())
}

async fn apply_control(pipeline: &Pipeline, control: ScheduledControl) -> anyhow::Result<()> {
    let Some(driver) = pipeline.plugin(&control.plugin).cloned() else {
        bail!("unknown plugin {}", control.plugin);
    };
    info!(plugin = %control.plugin, message = ?control.message, "Applying control message");
    let message = control.message;
    if let Err(e) = tokio::task::spawn_blocking(move || driver.handle_control(message)).await? {
        warn!(plugin = %control.plugin, error = %e, "Control message rejected");
    }
    Ok(())
}

async fn monitor(
    mut stats_rx: mpsc::Receiver<PluginStatsUpdate>,
    mut state_rx: mpsc::Receiver<PluginStateUpdate>,
) {
    let mut stats_open = true;
    let mut state_open = true;
    while stats_open || state_open {
        tokio::select! {
            update = stats_rx.recv(), if stats_open => match update {
                Some(update) => debug!(
                    plugin = %update.plugin,
                    array_counter = update.stats.array_counter,
                    dropped_arrays = update.stats.dropped_arrays,
                    last_unique_id = ?update.stats.last_array.as_ref().map(|a| a.unique_id),
                    "Plugin stats update"
                ),
                None => stats_open = false,
            },
            update = state_rx.recv(), if state_open => match update {
                Some(update) => {
                    info!(plugin = %update.plugin, change = ?update.change, "Plugin state changed");
                },
                None => state_open = false,
            },
        }
    }
}

/// Runs one acquisition as described by `config` and returns the final counters.
///
/// The run ends when the detector reaches its `frame_count`, when
/// `run.duration_secs` elapses, or on Ctrl+C, whichever comes first.
///
/// # Errors
///
/// Returns an error if the pipeline cannot be built, a scheduled control message
/// targets an unknown plugin, or the detector thread cannot be started.
pub async fn run(config: &Config) -> anyhow::Result<RunSummary> {
    let duration = config.run.duration().map_err(anyhow::Error::msg)?;

    let (stats_tx, stats_rx) = mpsc::channel(DEFAULT_MONITOR_CAPACITY);
    let (state_tx, state_rx) = mpsc::channel(DEFAULT_MONITOR_CAPACITY);
    let pipeline = Pipeline::build(config, &stats_tx, &state_tx)?;
    drop((stats_tx, state_tx));
    let monitor = tokio::spawn(monitor(stats_rx, state_rx));

    let mut controls = pending_controls(config, &pipeline)?;

    pipeline.detector().start().context("failed to start detector")?;
    let started = Instant::now();
    let run_start = tokio::time::Instant::now();
    info!(
        port = %config.detector.port,
        frame_rate = config.detector.frame_rate,
        frame_count = ?config.detector.frame_count,
        plugins = pipeline.plugins.len(),
        "Acquisition started"
    );

    let deadline = duration.map(|d| run_start + d);
    let mut report = tokio::time::interval(config.run.stats_interval());
    report.tick().await;
    let mut poll = tokio::time::interval(DETECTOR_POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let next_control =
            controls.front().map(|c| run_start + Duration::from_secs_f64(c.after_secs));
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping acquisition");
                break;
            }
            () = sleep_until(deadline) => {
                info!("Run duration elapsed");
                break;
            }
            () = sleep_until(next_control) => {
                if let Some(control) = controls.pop_front() {
                    apply_control(&pipeline, control).await?;
                }
            }
            _ = report.tick() => pipeline.log_counters(),
            _ = poll.tick() => {
                if !pipeline.detector().is_running() {
                    info!("Detector finished acquiring");
                    break;
                }
            }
        }
    }

    pipeline.log_counters();
    let summary = tokio::task::spawn_blocking(move || pipeline.shutdown(started))
        .await
        .context("shutdown task panicked")?;

    if tokio::time::timeout(MONITOR_DRAIN_TIMEOUT, monitor).await.is_err() {
        warn!("Monitor channels still open after shutdown");
    }

    info!(frames = summary.frames, elapsed = ?summary.elapsed, "Acquisition finished");
    for plugin in &summary.plugins {
        info!(
            plugin = %plugin.name,
            array_counter = plugin.stats.array_counter,
            dropped_arrays = plugin.stats.dropped_arrays,
            throttled = plugin.stats.throttled,
            processing_faults = plugin.stats.processing_faults,
            "Final plugin counters"
        );
    }
    Ok(summary)
}
