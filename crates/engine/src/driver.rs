// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The plugin driver: delivery decision, processing bookkeeping and control surface.
//!
//! ## Threads and locks
//!
//! The upstream port's thread calls [`PluginDriver::driver_callback`] while worker
//! threads process queued arrays and a control thread applies configuration
//! changes. They share `DriverShared`:
//!
//! - delivery settings (enable, blocking, active thread count) behind an `RwLock`,
//!   read-held by the producer across the enqueue so a control write never races
//!   a half-finished delivery decision
//! - the handoff queue behind an `RwLock<Arc<_>>`, swapped only while the pool is
//!   stopped
//! - counters as atomics
//!
//! Control operations are serialized by one `Mutex` owning the worker pool and the
//! upstream link. Neither the hot path nor the stats snapshot ever takes it.
//!
//! A processing routine must not call control operations on its own driver: a
//! control operation may be joining the very worker that runs the routine.

use ndkit_core::{
    ArrayCallback, ArrayPort, ArrayPublisher, Delivery, LinkState, NdKitError,
    PluginControlMessage, PluginStateUpdate, PluginStats, PluginStatsTracker, PluginStatsUpdate,
    PoolState, PortRegistry, Result, SharedArray, SubscriptionId,
};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio::sync::mpsc;

use crate::config::PluginConfig;
use crate::link::UpstreamLink;
use crate::metrics::DriverMetrics;
use crate::pool::{WorkHandler, WorkerPool};
use crate::processor::{ArrayProcessor, ProcessContext};
use crate::queue::{Enqueue, HandoffQueue};
use crate::throttle::{min_interval_from_secs, Throttle};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Settings consulted for every delivered array.
#[derive(Debug, Clone, Copy)]
struct DeliverySettings {
    enable: bool,
    blocking: bool,
    /// Workers actually running. 0 means synchronous processing.
    num_threads: usize,
}

/// Upstream source as reported in stats.
#[derive(Debug, Clone)]
struct SourceInfo {
    port: String,
    addr: usize,
    connected: bool,
}

impl SourceInfo {
    fn of(link: &UpstreamLink) -> Self {
        Self { port: link.port().to_string(), addr: link.addr(), connected: link.is_connected() }
    }
}

/// State shared between the producer, the workers and the control thread.
pub(crate) struct DriverShared {
    name: String,
    processor: Arc<dyn ArrayProcessor>,
    publisher: ArrayPublisher,
    settings: RwLock<DeliverySettings>,
    source: RwLock<SourceInfo>,
    throttle: Mutex<Throttle>,
    queue: RwLock<Arc<HandoffQueue>>,
    array_counter: AtomicU64,
    dropped: AtomicU64,
    throttled: AtomicU64,
    faults: AtomicU64,
    /// Last execution time in milliseconds, as `f64` bits.
    execution_time_ms: AtomicU64,
    last_array: Mutex<Option<SharedArray>>,
    stats_tracker: Mutex<PluginStatsTracker>,
    metrics: DriverMetrics,
}

impl DriverShared {
    fn current_queue(&self) -> Arc<HandoffQueue> {
        Arc::clone(&read(&self.queue))
    }

    fn driver_callback(&self, array: SharedArray) -> Delivery {
        let settings = read(&self.settings);
        if !settings.enable {
            return Delivery::Disabled;
        }
        if !lock(&self.throttle).accept(Instant::now()) {
            self.throttled.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_throttled();
            return Delivery::Throttled;
        }
        if settings.num_threads == 0 || settings.blocking {
            drop(settings);
            self.process_callbacks(array);
            return Delivery::Processed;
        }

        let queue = read(&self.queue);
        let outcome = queue.try_enqueue(array);
        drop(queue);
        drop(settings);
        match outcome {
            Enqueue::Accepted => Delivery::Queued,
            Enqueue::Dropped(array) => {
                drop(array);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_dropped(1);
                Delivery::Dropped
            },
        }
    }

    /// Base bookkeeping, then the plugin's routine. Faults are contained here.
    fn process_callbacks(&self, array: SharedArray) {
        let started = Instant::now();
        self.array_counter.fetch_add(1, Ordering::Relaxed);

        {
            let mut last = lock(&self.last_array);
            let format_changed = last.as_ref().is_none_or(|prev| {
                prev.sizes() != array.sizes() || prev.data_type() != array.data_type()
            });
            if format_changed {
                tracing::debug!(
                    plugin = %self.name,
                    unique_id = array.unique_id(),
                    timestamp = array.timestamp(),
                    data_type = ?array.data_type(),
                    dims = ?array.sizes(),
                    "Array format changed"
                );
            }
            *last = Some(Arc::clone(&array));
        }

        let ctx = ProcessContext::new(&self.name, &self.publisher);
        let outcome =
            std::panic::catch_unwind(AssertUnwindSafe(|| self.processor.process(&array, &ctx)));
        let unique_id = array.unique_id();
        drop(array);

        match outcome {
            Ok(Ok(())) => {},
            Ok(Err(e)) => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_fault();
                tracing::warn!(plugin = %self.name, unique_id, error = %e, "Processing failed");
            },
            Err(payload) => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_fault();
                tracing::error!(
                    plugin = %self.name,
                    unique_id,
                    panic = %panic_message(payload.as_ref()),
                    "Processing routine panicked"
                );
            },
        }

        let elapsed = started.elapsed();
        self.execution_time_ms
            .store((elapsed.as_secs_f64() * 1000.0).to_bits(), Ordering::Relaxed);
        self.metrics.record_processed(elapsed);
        lock(&self.stats_tracker).maybe_send(|| self.snapshot());
    }

    fn snapshot(&self) -> PluginStats {
        let settings = *read(&self.settings);
        let source = read(&self.source).clone();
        let queue = self.current_queue();
        PluginStats {
            plugin_type: self.processor.plugin_type().to_string(),
            array_port: source.port,
            array_addr: source.addr,
            connected: source.connected,
            enable_callbacks: settings.enable,
            blocking_callbacks: settings.blocking,
            array_counter: self.array_counter.load(Ordering::Relaxed),
            dropped_arrays: self.dropped.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            processing_faults: self.faults.load(Ordering::Relaxed),
            queue_size: queue.capacity(),
            queue_free: queue.free(),
            num_threads: settings.num_threads,
            execution_time_ms: f64::from_bits(self.execution_time_ms.load(Ordering::Relaxed)),
            min_callback_time: lock(&self.throttle).min_interval().as_secs_f64(),
            last_array: lock(&self.last_array).as_ref().map(|a| a.info()),
        }
    }

    /// Takes every queued array off the queue and counts it as dropped.
    fn discard_queued(&self) -> usize {
        let drained = self.current_queue().drain();
        let count = drained.len();
        if count > 0 {
            self.dropped.fetch_add(count as u64, Ordering::Relaxed);
            self.metrics.record_dropped(count as u64);
        }
        count
    }
}

impl WorkHandler for DriverShared {
    fn handle(&self, array: SharedArray) {
        self.process_callbacks(array);
    }
}

struct ControlState {
    pool: WorkerPool,
    link: UpstreamLink,
    shut_down: bool,
}

/// Drives one plugin: receives arrays from an upstream port and runs them through
/// an [`ArrayProcessor`], either on the producer's thread or on a worker pool fed by
/// a bounded queue.
///
/// A driver is also an [`ArrayPort`]: whatever its processor publishes can feed
/// downstream plugins.
pub struct PluginDriver {
    shared: Arc<DriverShared>,
    control: Mutex<ControlState>,
    max_threads: usize,
}

impl PluginDriver {
    /// Creates a driver without monitoring channels. See [`PluginDriver::start_with_channels`].
    ///
    /// # Errors
    ///
    /// See [`PluginDriver::start_with_channels`].
    pub fn start(
        config: PluginConfig,
        processor: Arc<dyn ArrayProcessor>,
        registry: &PortRegistry,
    ) -> Result<Arc<Self>> {
        Self::start_with_channels(config, processor, registry, None, None)
    }

    /// Creates a driver, starts its worker pool and, when callbacks are enabled and
    /// `auto_connect` is set, connects it to its upstream port.
    ///
    /// # Errors
    ///
    /// - `NdKitError::Configuration` if `config` fails validation
    /// - `NdKitError::Runtime` if the worker threads cannot be started
    /// - `NdKitError::Connection` if auto-connecting fails
    pub fn start_with_channels(
        config: PluginConfig,
        processor: Arc<dyn ArrayProcessor>,
        registry: &PortRegistry,
        stats_tx: Option<mpsc::Sender<PluginStatsUpdate>>,
        state_tx: Option<mpsc::Sender<PluginStateUpdate>>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let min_interval = min_interval_from_secs(config.min_callback_time)?;
        let max_threads = config.max_threads;
        let num_threads = Self::clamp_threads(&config.name, config.num_threads, max_threads);

        let shared = Arc::new(DriverShared {
            name: config.name.clone(),
            processor,
            publisher: ArrayPublisher::new(config.name.clone(), config.max_addr),
            settings: RwLock::new(DeliverySettings {
                enable: false,
                blocking: config.blocking_callbacks,
                num_threads: 0,
            }),
            source: RwLock::new(SourceInfo {
                port: config.array_port.clone(),
                addr: config.array_addr,
                connected: false,
            }),
            throttle: Mutex::new(Throttle::new(min_interval)),
            queue: RwLock::new(Arc::new(HandoffQueue::new(config.queue_size))),
            array_counter: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            faults: AtomicU64::new(0),
            execution_time_ms: AtomicU64::new(0.0_f64.to_bits()),
            last_array: Mutex::new(None),
            stats_tracker: Mutex::new(PluginStatsTracker::new(config.name.clone(), stats_tx)),
            metrics: DriverMetrics::new(&config.name),
        });

        let weak = Arc::downgrade(&shared);
        let callback: ArrayCallback = Arc::new(move |array| {
            if let Some(shared) = weak.upgrade() {
                shared.driver_callback(array);
            }
        });
        let link = UpstreamLink::new(
            config.name.clone(),
            registry.clone(),
            config.array_port.clone(),
            config.array_addr,
            callback,
            state_tx.clone(),
        );
        let pool = WorkerPool::new(
            config.name.clone(),
            config.thread_stack_size,
            config.dequeue_timeout(),
            state_tx,
        );

        let driver = Arc::new(Self {
            shared,
            control: Mutex::new(ControlState { pool, link, shut_down: false }),
            max_threads,
        });

        {
            let mut control = lock(&driver.control);
            driver.start_workers(&mut control, num_threads)?;
            write(&driver.shared.settings).enable = config.enable_callbacks;
            if config.enable_callbacks && config.auto_connect {
                let connected = control.link.connect();
                *write(&driver.shared.source) = SourceInfo::of(&control.link);
                connected?;
            }
        }

        tracing::info!(
            plugin = %config.name,
            plugin_type = %driver.shared.processor.plugin_type(),
            array_port = %config.array_port,
            array_addr = config.array_addr,
            num_threads,
            queue_size = config.queue_size,
            blocking = config.blocking_callbacks,
            enable_callbacks = config.enable_callbacks,
            "Plugin started"
        );
        Ok(driver)
    }

    fn clamp_threads(plugin: &str, requested: usize, max_threads: usize) -> usize {
        if requested > max_threads {
            tracing::warn!(plugin, requested, max_threads, "Thread count clamped to maximum");
            max_threads
        } else {
            requested
        }
    }

    fn handler(&self) -> Arc<dyn WorkHandler> {
        self.shared.clone()
    }

    fn control(&self) -> Result<MutexGuard<'_, ControlState>> {
        let control = lock(&self.control);
        if control.shut_down {
            return Err(NdKitError::Runtime(format!("{} is shut down", self.shared.name)));
        }
        Ok(control)
    }

    fn sync_source(&self, link: &UpstreamLink) {
        *write(&self.shared.source) = SourceInfo::of(link);
    }

    /// Starts `count` workers on the current queue and publishes the new count to
    /// the hot path once they are running.
    fn start_workers(&self, control: &mut ControlState, count: usize) -> Result<()> {
        let queue = self.shared.current_queue();
        control.pool.start(count, &queue, &self.handler())?;
        write(&self.shared.settings).num_threads = control.pool.thread_count();
        Ok(())
    }

    /// Switches to synchronous processing and runs anything still queued on the
    /// calling thread.
    fn stop_workers(&self, control: &mut ControlState) -> Result<()> {
        write(&self.shared.settings).num_threads = 0;
        control.pool.stop()?;
        for array in self.shared.current_queue().drain() {
            self.shared.process_callbacks(array);
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn plugin_type(&self) -> &str {
        self.shared.processor.plugin_type()
    }

    pub const fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Hands one array to the plugin. This is what the upstream subscription calls.
    ///
    /// Never blocks in queued mode. In blocking mode (or with no workers) it returns
    /// once the plugin has processed the array.
    pub fn driver_callback(&self, array: SharedArray) -> Delivery {
        self.shared.driver_callback(array)
    }

    /// Current counters and settings.
    pub fn stats(&self) -> PluginStats {
        self.shared.snapshot()
    }

    pub fn pool_state(&self) -> PoolState {
        lock(&self.control).pool.state()
    }

    pub fn link_state(&self) -> LinkState {
        let source = read(&self.shared.source);
        if source.connected {
            LinkState::Connected { port: source.port.clone(), addr: source.addr }
        } else {
            LinkState::Disconnected
        }
    }

    /// Enables or disables array callbacks. Enabling connects to the upstream port,
    /// disabling disconnects from it.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Connection` if the upstream port cannot be reached.
    /// Callbacks stay disabled.
    pub fn set_enable_callbacks(&self, enable: bool) -> Result<()> {
        let mut control = self.control()?;
        if enable {
            let connected = control.link.connect();
            self.sync_source(&control.link);
            connected?;
            write(&self.shared.settings).enable = true;
        } else {
            write(&self.shared.settings).enable = false;
            control.link.disconnect();
            self.sync_source(&control.link);
        }
        tracing::info!(plugin = %self.shared.name, enable, "Callbacks toggled");
        Ok(())
    }

    /// Switches between processing on the producer's thread and handing off to the
    /// worker pool. Applies to the next array.
    ///
    /// Arrays already queued when switching to blocking mode still complete on the
    /// workers and may finish after arrays processed synchronously.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Runtime` after shutdown.
    pub fn set_blocking_callbacks(&self, blocking: bool) -> Result<()> {
        let _control = self.control()?;
        write(&self.shared.settings).blocking = blocking;
        tracing::info!(plugin = %self.shared.name, blocking, "Blocking mode changed");
        Ok(())
    }

    /// Resizes the worker pool. Values above the maximum are clamped. 0 switches to
    /// processing on the producer's thread, after running anything still queued.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Runtime` if the new workers cannot be started. The
    /// previous count is restored when possible.
    pub fn set_num_threads(&self, requested: usize) -> Result<()> {
        let mut control = self.control()?;
        let count = Self::clamp_threads(&self.shared.name, requested, self.max_threads);
        let previous = control.pool.thread_count();
        if count == previous {
            return Ok(());
        }

        if count == 0 {
            self.stop_workers(&mut control)?;
        } else {
            control.pool.stop()?;
            if let Err(e) = self.start_workers(&mut control, count) {
                tracing::error!(plugin = %self.shared.name, error = %e, count, "Resize failed, restoring previous pool");
                if previous == 0 || self.start_workers(&mut control, previous).is_err() {
                    self.stop_workers(&mut control)?;
                }
                return Err(e);
            }
        }

        tracing::info!(plugin = %self.shared.name, from = previous, to = count, "Worker pool resized");
        Ok(())
    }

    /// Sets the minimum time in seconds between processed arrays.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Configuration` for negative or non-finite values; the
    /// previous interval is kept.
    pub fn set_min_callback_time(&self, secs: f64) -> Result<()> {
        let _control = self.control()?;
        let interval = min_interval_from_secs(secs)?;
        lock(&self.shared.throttle).set_min_interval(interval);
        Ok(())
    }

    /// Points the plugin at another upstream port, keeping the address. Reconnects
    /// immediately when callbacks are enabled.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Connection` if reconnecting fails. The link stays
    /// disconnected until the next successful retarget or enable.
    pub fn set_array_port(&self, port: impl Into<String>) -> Result<()> {
        let mut control = self.control()?;
        let addr = control.link.addr();
        self.retarget(&mut control, port.into(), addr)
    }

    /// Moves to another address on the current upstream port.
    ///
    /// # Errors
    ///
    /// See [`PluginDriver::set_array_port`].
    pub fn set_array_addr(&self, addr: usize) -> Result<()> {
        let mut control = self.control()?;
        let port = control.link.port().to_string();
        self.retarget(&mut control, port, addr)
    }

    fn retarget(&self, control: &mut ControlState, port: String, addr: usize) -> Result<()> {
        let enabled = read(&self.shared.settings).enable;
        let result = control.link.retarget(port, addr, enabled);
        self.sync_source(&control.link);
        result
    }

    /// Rebuilds the handoff queue with a new capacity. Queued arrays carry over in
    /// order; any that do not fit are counted as dropped.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Configuration` for a capacity outside `1..=MAX_QUEUE_SIZE`
    /// (the queue and workers are left unchanged), or `NdKitError::Runtime` if the
    /// workers cannot be restarted.
    pub fn set_queue_size(&self, capacity: usize) -> Result<()> {
        crate::config::validate_queue_size(&self.shared.name, capacity)?;
        let mut control = self.control()?;
        let replacement = Arc::new(HandoffQueue::new(capacity));
        let threads = control.pool.thread_count();
        control.pool.stop()?;

        let overflow = {
            let mut slot = write(&self.shared.queue);
            replacement.set_dropped(slot.dropped());
            let mut overflow = 0usize;
            for array in slot.drain() {
                if let Enqueue::Dropped(array) = replacement.try_enqueue(array) {
                    drop(array);
                    overflow += 1;
                }
            }
            *slot = replacement;
            overflow
        };
        if overflow > 0 {
            self.shared.dropped.fetch_add(overflow as u64, Ordering::Relaxed);
            self.shared.metrics.record_dropped(overflow as u64);
            tracing::warn!(plugin = %self.shared.name, overflow, capacity, "Queued arrays did not fit the new queue");
        }

        if threads > 0 {
            if let Err(e) = self.start_workers(&mut control, threads) {
                self.stop_workers(&mut control)?;
                return Err(e);
            }
        }
        tracing::info!(plugin = %self.shared.name, capacity, "Queue size changed");
        Ok(())
    }

    /// Overwrites the dropped-array counter.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Runtime` after shutdown.
    pub fn set_dropped_arrays(&self, value: u64) -> Result<()> {
        let _control = self.control()?;
        self.shared.dropped.store(value, Ordering::Relaxed);
        self.shared.current_queue().set_dropped(value);
        Ok(())
    }

    /// Overwrites the array counter.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Runtime` after shutdown.
    pub fn set_array_counter(&self, value: u64) -> Result<()> {
        let _control = self.control()?;
        self.shared.array_counter.store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Runs the most recently received array through [`PluginDriver::driver_callback`] again.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Runtime` if no array has been processed yet.
    pub fn process_plugin(&self) -> Result<Delivery> {
        drop(self.control()?);
        let last = lock(&self.shared.last_array).clone();
        let array = last.ok_or_else(|| {
            NdKitError::Runtime(format!("{}: no array to process", self.shared.name))
        })?;
        Ok(self.shared.driver_callback(array))
    }

    /// Applies one control message.
    ///
    /// # Errors
    ///
    /// Whatever the corresponding setter returns.
    pub fn handle_control(&self, message: PluginControlMessage) -> Result<()> {
        tracing::debug!(plugin = %self.shared.name, ?message, "Control message");
        match message {
            PluginControlMessage::SetEnableCallbacks(enable) => self.set_enable_callbacks(enable),
            PluginControlMessage::SetBlockingCallbacks(blocking) => {
                self.set_blocking_callbacks(blocking)
            },
            PluginControlMessage::SetNumThreads(count) => self.set_num_threads(count),
            PluginControlMessage::SetMinCallbackTime(secs) => self.set_min_callback_time(secs),
            PluginControlMessage::SetArrayPort(port) => self.set_array_port(port),
            PluginControlMessage::SetArrayAddr(addr) => self.set_array_addr(addr),
            PluginControlMessage::SetQueueSize(capacity) => self.set_queue_size(capacity),
            PluginControlMessage::SetDroppedArrays(value) => self.set_dropped_arrays(value),
            PluginControlMessage::SetArrayCounter(value) => self.set_array_counter(value),
            PluginControlMessage::ProcessPlugin => self.process_plugin().map(|_| ()),
        }
    }

    /// Disconnects, stops the workers and releases every queued array (counted as
    /// dropped). Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        let mut control = lock(&self.control);
        if control.shut_down {
            return;
        }
        control.shut_down = true;

        write(&self.shared.settings).enable = false;
        control.link.disconnect();
        self.sync_source(&control.link);

        if let Err(e) = control.pool.stop() {
            tracing::error!(plugin = %self.shared.name, error = %e, "Failed to stop worker pool");
        }
        write(&self.shared.settings).num_threads = 0;

        let discarded = self.shared.discard_queued();
        if discarded > 0 {
            tracing::warn!(plugin = %self.shared.name, discarded, "Dropped queued arrays on shutdown");
        }
        drop(control);

        let final_stats = self.shared.snapshot();
        lock(&self.shared.stats_tracker).force_send(final_stats);
        *lock(&self.shared.last_array) = None;
        tracing::info!(plugin = %self.shared.name, "Plugin shut down");
    }
}

impl Drop for PluginDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ArrayPort for PluginDriver {
    fn port_name(&self) -> &str {
        self.shared.publisher.port_name()
    }

    fn max_addr(&self) -> usize {
        self.shared.publisher.max_addr()
    }

    fn register_callback(&self, addr: usize, callback: ArrayCallback) -> Result<SubscriptionId> {
        self.shared.publisher.register_callback(addr, callback)
    }

    fn deregister_callback(&self, id: SubscriptionId) -> bool {
        self.shared.publisher.deregister_callback(id)
    }
}

impl std::fmt::Debug for PluginDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDriver")
            .field("name", &self.shared.name)
            .field("plugin_type", &self.plugin_type())
            .field("max_threads", &self.max_threads)
            .finish_non_exhaustive()
    }
}
