// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Worker threads draining a plugin's handoff queue.
//!
//! A pool is replaced wholesale on resize: the current generation is stopped and
//! joined, then a fresh generation is started on the same queue. Each generation has
//! its own stop flag and stop sentinels are tagged with the generation number, so a
//! sentinel left behind by an old generation is ignored by the new one.

use crossbeam_channel::RecvTimeoutError;
use ndkit_core::{state_helpers, NdKitError, PluginStateUpdate, PoolState, Result, SharedArray};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::constants::WORKER_READY_TIMEOUT;
use crate::queue::{Dequeued, HandoffQueue};

/// What a worker does with each dequeued array.
pub trait WorkHandler: Send + Sync + 'static {
    fn handle(&self, array: SharedArray);
}

struct Generation {
    id: u64,
    stop: Arc<AtomicBool>,
    queue: Arc<HandoffQueue>,
    workers: Vec<JoinHandle<()>>,
    thread_ids: Vec<ThreadId>,
}

/// A fixed-size set of worker threads for one plugin.
///
/// Not shared between threads itself: the owning driver keeps it behind its control
/// mutex, which serializes start, stop and resize.
pub struct WorkerPool {
    plugin: String,
    stack_size: Option<usize>,
    dequeue_timeout: Duration,
    state_tx: Option<mpsc::Sender<PluginStateUpdate>>,
    next_generation: u64,
    state: PoolState,
    current: Option<Generation>,
}

impl WorkerPool {
    pub fn new(
        plugin: impl Into<String>,
        stack_size: Option<usize>,
        dequeue_timeout: Duration,
        state_tx: Option<mpsc::Sender<PluginStateUpdate>>,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            stack_size,
            dequeue_timeout,
            state_tx,
            next_generation: 0,
            state: PoolState::Stopped,
            current: None,
        }
    }

    pub const fn state(&self) -> PoolState {
        self.state
    }

    /// Number of running worker threads.
    pub const fn thread_count(&self) -> usize {
        self.state.running_threads()
    }

    fn set_state(&mut self, state: PoolState) {
        self.state = state;
        state_helpers::emit_pool(self.state_tx.as_ref(), &self.plugin, state);
    }

    /// Starts `count` workers on `queue`. Returns once every worker is running.
    ///
    /// Does nothing if the pool is already running or `count` is 0.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Runtime` if a thread cannot be spawned or does not report
    /// ready in time. Any workers already started are stopped again.
    pub fn start(
        &mut self,
        count: usize,
        queue: &Arc<HandoffQueue>,
        handler: &Arc<dyn WorkHandler>,
    ) -> Result<()> {
        if self.current.is_some() || count == 0 {
            return Ok(());
        }

        let stale = queue.discard_stops();
        if stale > 0 {
            tracing::trace!(plugin = %self.plugin, stale, "Discarded unconsumed stop sentinels");
        }
        let id = self.next_generation;
        self.next_generation += 1;
        self.set_state(PoolState::Starting { threads: count });

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(count);
        let mut generation = Generation {
            id,
            stop: Arc::clone(&stop),
            queue: Arc::clone(queue),
            workers: Vec::with_capacity(count),
            thread_ids: Vec::with_capacity(count),
        };

        for index in 0..count {
            let worker = Worker {
                generation: id,
                stop: Arc::clone(&stop),
                queue: Arc::clone(queue),
                handler: Arc::clone(handler),
                dequeue_timeout: self.dequeue_timeout,
                ready_tx: ready_tx.clone(),
            };
            let mut builder =
                std::thread::Builder::new().name(format!("ndkit-{}-worker-{index}", self.plugin));
            if let Some(stack_size) = self.stack_size {
                builder = builder.stack_size(stack_size);
            }
            match builder.spawn(move || worker.run()) {
                Ok(handle) => {
                    generation.thread_ids.push(handle.thread().id());
                    generation.workers.push(handle);
                },
                Err(e) => {
                    tracing::error!(plugin = %self.plugin, error = %e, "Failed to spawn worker thread");
                    self.current = Some(generation);
                    self.stop()?;
                    return Err(NdKitError::Runtime(format!(
                        "{}: failed to spawn worker thread: {e}",
                        self.plugin
                    )));
                },
            }
        }
        drop(ready_tx);
        self.current = Some(generation);

        let deadline = Instant::now() + WORKER_READY_TIMEOUT;
        for _ in 0..count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match ready_rx.recv_timeout(remaining) {
                Ok(()) => {},
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    self.stop()?;
                    return Err(NdKitError::Runtime(format!(
                        "{}: worker threads did not start within {WORKER_READY_TIMEOUT:?}",
                        self.plugin
                    )));
                },
            }
        }

        tracing::debug!(plugin = %self.plugin, threads = count, generation = id, "Worker pool running");
        self.set_state(PoolState::Running { threads: count });
        Ok(())
    }

    /// Stops and joins every worker. Each finishes the array it is processing;
    /// arrays still queued stay on the queue.
    ///
    /// Does nothing if the pool is already stopped.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Runtime` when called from one of the pool's own workers,
    /// which could never be joined. The workers are still told to exit, and a later
    /// `stop` from another thread joins them.
    pub fn stop(&mut self) -> Result<()> {
        let Some(generation) = self.current.take() else {
            return Ok(());
        };
        // Set even when the join below is refused, so the workers still exit.
        generation.stop.store(true, Ordering::Release);
        for _ in 0..generation.workers.len() {
            generation.queue.push_stop(generation.id);
        }

        let me = std::thread::current().id();
        if generation.thread_ids.contains(&me) {
            let plugin = self.plugin.clone();
            self.current = Some(generation);
            return Err(NdKitError::Runtime(format!(
                "{plugin}: worker pool cannot be joined from one of its own workers"
            )));
        }

        self.set_state(PoolState::Stopping);
        for handle in generation.workers {
            if handle.join().is_err() {
                tracing::warn!(plugin = %self.plugin, "Worker thread panicked");
            }
        }

        tracing::debug!(plugin = %self.plugin, generation = generation.id, "Worker pool stopped");
        self.set_state(PoolState::Stopped);
        Ok(())
    }

    /// Replaces the running workers with `count` new ones on `queue`.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::start`] and [`WorkerPool::stop`].
    pub fn resize(
        &mut self,
        count: usize,
        queue: &Arc<HandoffQueue>,
        handler: &Arc<dyn WorkHandler>,
    ) -> Result<()> {
        self.stop()?;
        self.start(count, queue, handler)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(plugin = %self.plugin, error = %e, "Worker pool dropped while running");
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("plugin", &self.plugin)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

struct Worker {
    generation: u64,
    stop: Arc<AtomicBool>,
    queue: Arc<HandoffQueue>,
    handler: Arc<dyn WorkHandler>,
    dequeue_timeout: Duration,
    ready_tx: crossbeam_channel::Sender<()>,
}

impl Worker {
    fn run(self) {
        let _ = self.ready_tx.send(());
        drop(self.ready_tx);

        while !self.stop.load(Ordering::Acquire) {
            match self.queue.dequeue(self.dequeue_timeout) {
                Dequeued::Array(array) => self.handler.handle(array),
                Dequeued::Stop(generation) if generation == self.generation => break,
                // Stale sentinel from an earlier generation.
                Dequeued::Stop(_) | Dequeued::TimedOut => {},
            }
        }
    }
}
