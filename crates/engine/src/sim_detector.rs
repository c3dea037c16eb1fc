// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Simulated detector: an upstream port producing ramp images on its own thread.

use crossbeam_channel::{RecvTimeoutError, Sender, TryRecvError};
use ndkit_core::{
    ArrayCallback, ArrayPort, ArrayPublisher, NDArray, NDAttribute, NDDataType, NDElement,
    NdKitError, Result, SubscriptionId,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use crate::constants::DEFAULT_OUTPUT_ADDRESSES;

/// Configuration of a [`SimDetector`].
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(default)]
pub struct SimDetectorConfig {
    /// Port name plugins connect to (default: "SIM1")
    pub port: String,
    pub size_x: usize,
    pub size_y: usize,
    pub data_type: NDDataType,
    /// Frames per second. 0 produces as fast as possible.
    pub frame_rate: f64,
    /// Stop after this many frames. Runs until stopped when unset.
    pub frame_count: Option<u64>,
    /// Number of addresses; every frame is published on address 0.
    pub max_addr: usize,
}

impl Default for SimDetectorConfig {
    fn default() -> Self {
        Self {
            port: "SIM1".to_string(),
            size_x: 256,
            size_y: 256,
            data_type: NDDataType::UInt16,
            frame_rate: 10.0,
            frame_count: None,
            max_addr: DEFAULT_OUTPUT_ADDRESSES,
        }
    }
}

impl SimDetectorConfig {
    fn period(&self) -> Result<Option<Duration>> {
        if !self.frame_rate.is_finite() || self.frame_rate < 0.0 {
            return Err(NdKitError::Configuration(format!(
                "{}: frame_rate must be a finite, non-negative number (got {})",
                self.port, self.frame_rate
            )));
        }
        if self.frame_rate <= 0.0 {
            return Ok(None);
        }
        Duration::try_from_secs_f64(1.0 / self.frame_rate).map(Some).map_err(|e| {
            NdKitError::Configuration(format!("{}: invalid frame_rate: {e}", self.port))
        })
    }
}

fn ramp<T: NDElement>(dims: &[usize], value: impl Fn(usize) -> T) -> Result<NDArray> {
    let len = dims.iter().product::<usize>();
    let values: Vec<T> = (0..len).map(value).collect();
    NDArray::from_elements(dims, &values)
}

/// Builds one ramp frame: pixel `(x, y)` of frame `n` holds `x + y + n`, wrapping
/// at the data type's range.
///
/// # Errors
///
/// Returns `NdKitError::Configuration` for a zero-sized image.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]
pub fn ramp_frame(size_x: usize, size_y: usize, data_type: NDDataType, n: u64) -> Result<NDArray> {
    let dims = [size_x, size_y];
    let value = |i: usize| (i % size_x.max(1) + i / size_x.max(1)) as u64 + n;
    match data_type {
        NDDataType::Int8 => ramp(&dims, |i| value(i) as i8),
        NDDataType::UInt8 => ramp(&dims, |i| value(i) as u8),
        NDDataType::Int16 => ramp(&dims, |i| value(i) as i16),
        NDDataType::UInt16 => ramp(&dims, |i| value(i) as u16),
        NDDataType::Int32 => ramp(&dims, |i| value(i) as i32),
        NDDataType::UInt32 => ramp(&dims, |i| value(i) as u32),
        NDDataType::Int64 => ramp(&dims, |i| value(i) as i64),
        NDDataType::UInt64 => ramp(&dims, value),
        NDDataType::Float32 => ramp(&dims, |i| value(i) as f32),
        NDDataType::Float64 => ramp(&dims, |i| value(i) as f64),
    }
}

/// Everything the producer thread needs to publish frames.
struct FrameSource {
    config: SimDetectorConfig,
    publisher: ArrayPublisher,
    next_id: AtomicU64,
    epoch: Instant,
}

impl FrameSource {
    fn publish_next(&self) -> Result<usize> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = ramp_frame(self.config.size_x, self.config.size_y, self.config.data_type, id)?
            .with_unique_id(id)
            .with_timestamp(self.epoch.elapsed().as_secs_f64())
            .with_wall_time(SystemTime::now())
            .with_attribute(NDAttribute::new("SourcePort", self.config.port.clone()))
            .into_shared();
        Ok(self.publisher.publish(0, &frame))
    }

    fn run(&self, period: Option<Duration>, stop_rx: &crossbeam_channel::Receiver<()>) -> u64 {
        let mut produced = 0u64;
        let mut deadline = Instant::now();
        loop {
            if self.config.frame_count.is_some_and(|limit| produced >= limit) {
                break;
            }
            if !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty)) {
                break;
            }
            if let Err(e) = self.publish_next() {
                tracing::error!(port = %self.config.port, error = %e, "Failed to generate frame");
                break;
            }
            produced += 1;

            if let Some(period) = period {
                deadline += period;
                let wait = deadline.saturating_duration_since(Instant::now());
                if !matches!(stop_rx.recv_timeout(wait), Err(RecvTimeoutError::Timeout)) {
                    break;
                }
            }
        }
        produced
    }
}

struct Producer {
    stop_tx: Sender<()>,
    handle: JoinHandle<u64>,
}

/// A detector that publishes generated ramp images on its port.
///
/// Frames are produced either on a dedicated thread ([`SimDetector::start`]) or on
/// the caller's thread ([`SimDetector::acquire`]). In both cases plugin callbacks
/// run on that producing thread.
pub struct SimDetector {
    source: Arc<FrameSource>,
    period: Option<Duration>,
    producer: Mutex<Option<Producer>>,
}

impl SimDetector {
    /// # Errors
    ///
    /// Returns `NdKitError::Configuration` for a zero-sized image or an invalid frame rate.
    pub fn new(config: SimDetectorConfig) -> Result<Self> {
        if config.size_x == 0 || config.size_y == 0 {
            return Err(NdKitError::Configuration(format!(
                "{}: image size must be non-zero (got {}x{})",
                config.port, config.size_x, config.size_y
            )));
        }
        let period = config.period()?;
        let publisher = ArrayPublisher::new(config.port.clone(), config.max_addr);
        Ok(Self {
            source: Arc::new(FrameSource {
                config,
                publisher,
                next_id: AtomicU64::new(0),
                epoch: Instant::now(),
            }),
            period,
            producer: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SimDetectorConfig {
        &self.source.config
    }

    /// Unique id of the most recently published frame (0 before the first).
    pub fn frames_published(&self) -> u64 {
        self.source.next_id.load(Ordering::Relaxed)
    }

    /// Publishes `count` frames on the calling thread, ignoring the frame rate.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame cannot be generated.
    pub fn acquire(&self, count: u64) -> Result<()> {
        for _ in 0..count {
            self.source.publish_next()?;
        }
        Ok(())
    }

    /// Starts the producer thread. Does nothing if it is already running.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Runtime` if the thread cannot be spawned.
    pub fn start(&self) -> Result<()> {
        let mut producer = self.producer.lock().unwrap_or_else(PoisonError::into_inner);
        if producer.as_ref().is_some_and(|p| !p.handle.is_finished()) {
            return Ok(());
        }
        if let Some(finished) = producer.take() {
            let _ = finished.handle.join();
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let source = Arc::clone(&self.source);
        let period = self.period;
        let handle = std::thread::Builder::new()
            .name(format!("ndkit-sim-{}", self.source.config.port))
            .spawn(move || source.run(period, &stop_rx))
            .map_err(|e| {
                NdKitError::Runtime(format!(
                    "{}: failed to spawn producer thread: {e}",
                    self.source.config.port
                ))
            })?;
        *producer = Some(Producer { stop_tx, handle });

        tracing::info!(
            port = %self.source.config.port,
            frame_rate = self.source.config.frame_rate,
            frame_count = ?self.source.config.frame_count,
            "Acquisition started"
        );
        Ok(())
    }

    /// Whether the producer thread is still producing.
    pub fn is_running(&self) -> bool {
        self.producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }

    /// Stops the producer thread and returns how many frames it published.
    /// Returns 0 if it was not started.
    pub fn stop(&self) -> u64 {
        let Some(Producer { stop_tx, handle }) =
            self.producer.lock().unwrap_or_else(PoisonError::into_inner).take()
        else {
            return 0;
        };
        drop(stop_tx);
        match handle.join() {
            Ok(produced) => {
                tracing::info!(port = %self.source.config.port, produced, "Acquisition stopped");
                produced
            },
            Err(_) => {
                tracing::error!(port = %self.source.config.port, "Producer thread panicked");
                0
            },
        }
    }
}

impl Drop for SimDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ArrayPort for SimDetector {
    fn port_name(&self) -> &str {
        self.source.publisher.port_name()
    }

    fn max_addr(&self) -> usize {
        self.source.publisher.max_addr()
    }

    fn register_callback(&self, addr: usize, callback: ArrayCallback) -> Result<SubscriptionId> {
        self.source.publisher.register_callback(addr, callback)
    }

    fn deregister_callback(&self, id: SubscriptionId) -> bool {
        self.source.publisher.deregister_callback(id)
    }
}

impl std::fmt::Debug for SimDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDetector")
            .field("config", &self.source.config)
            .field("frames_published", &self.frames_published())
            .finish_non_exhaustive()
    }
}
