// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Bounded handoff queue between the producer thread and the worker pool.
//!
//! The producer side never blocks: [`HandoffQueue::try_enqueue`] either places the
//! array or hands it straight back as dropped. Workers block in
//! [`HandoffQueue::dequeue`] with a timeout. Stop sentinels travel on a separate
//! unbounded channel, so they never occupy an array slot, and a worker blocked on an
//! empty queue wakes as soon as it is asked to exit.

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use ndkit_core::SharedArray;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Result of a non-blocking enqueue.
#[derive(Debug)]
pub enum Enqueue {
    Accepted,
    /// The queue was full. The array is handed back so the caller releases it.
    Dropped(SharedArray),
}

/// Result of a blocking dequeue.
#[derive(Debug)]
pub enum Dequeued {
    Array(SharedArray),
    TimedOut,
    /// A stop sentinel for the given pool generation.
    Stop(u64),
}

/// Fixed-capacity, multi-producer multi-consumer queue of array handles.
pub struct HandoffQueue {
    tx: Sender<SharedArray>,
    rx: Receiver<SharedArray>,
    stop_tx: Sender<u64>,
    stop_rx: Receiver<u64>,
    capacity: usize,
    dropped: AtomicU64,
}

impl HandoffQueue {
    /// Creates a queue holding at most `capacity` arrays (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        let (stop_tx, stop_rx) = unbounded();
        Self { tx, rx, stop_tx, stop_rx, capacity, dropped: AtomicU64::new(0) }
    }

    /// Places `array` on the queue without blocking.
    pub fn try_enqueue(&self, array: SharedArray) -> Enqueue {
        match self.tx.try_send(array) {
            Ok(()) => Enqueue::Accepted,
            Err(TrySendError::Full(array) | TrySendError::Disconnected(array)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Enqueue::Dropped(array)
            },
        }
    }

    /// Waits up to `timeout` for the next array or stop sentinel.
    pub fn dequeue(&self, timeout: Duration) -> Dequeued {
        // Both ends of each channel live in `self`, so neither can disconnect while we
        // are borrowed.
        select! {
            recv(self.stop_rx) -> generation => generation.map_or(Dequeued::TimedOut, Dequeued::Stop),
            recv(self.rx) -> array => array.map_or(Dequeued::TimedOut, Dequeued::Array),
            default(timeout) => Dequeued::TimedOut,
        }
    }

    /// Sends a stop sentinel for `generation`. Never blocks and never takes an array slot.
    pub(crate) fn push_stop(&self, generation: u64) {
        let _ = self.stop_tx.send(generation);
    }

    /// Discards sentinels nobody consumed, e.g. those addressed to workers that exited
    /// on their stop flag instead.
    pub(crate) fn discard_stops(&self) -> usize {
        self.stop_rx.try_iter().count()
    }

    /// Removes every queued array in FIFO order.
    pub fn drain(&self) -> Vec<SharedArray> {
        self.rx.try_iter().collect()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Arrays currently queued.
    pub fn depth(&self) -> usize {
        self.rx.len()
    }

    /// Free array slots.
    pub fn free(&self) -> usize {
        self.capacity.saturating_sub(self.rx.len())
    }

    /// Arrays rejected because the queue was full, since creation or the last reset.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn set_dropped(&self, value: u64) {
        self.dropped.store(value, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for HandoffQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffQueue")
            .field("capacity", &self.capacity)
            .field("depth", &self.depth())
            .field("dropped", &self.dropped())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ndkit_core::{NDArray, NDDataType};
    use std::sync::Arc;

    fn array(id: u64) -> SharedArray {
        NDArray::zeros(&[2, 2], NDDataType::UInt8).unwrap().with_unique_id(id).into_shared()
    }

    #[test]
    fn accepts_up_to_capacity_then_drops() {
        for (capacity, attempts) in [(1usize, 1usize), (2, 5), (4, 4), (3, 10), (8, 2)] {
            let queue = HandoffQueue::new(capacity);
            let mut accepted = 0;
            let mut dropped = 0;
            for id in 0..attempts {
                match queue.try_enqueue(array(id as u64)) {
                    Enqueue::Accepted => accepted += 1,
                    Enqueue::Dropped(_) => dropped += 1,
                }
            }
            assert_eq!(accepted, attempts.min(capacity));
            assert_eq!(dropped, attempts.saturating_sub(capacity));
            assert_eq!(queue.dropped(), dropped as u64);
            assert_eq!(queue.depth(), accepted);
            assert_eq!(queue.free(), capacity - accepted);
        }
    }

    #[test]
    fn dropped_array_is_handed_back() {
        let queue = HandoffQueue::new(1);
        assert!(matches!(queue.try_enqueue(array(1)), Enqueue::Accepted));

        let rejected = array(2);
        let weak = Arc::downgrade(&rejected);
        match queue.try_enqueue(rejected) {
            Enqueue::Dropped(a) => assert_eq!(a.unique_id(), 2),
            Enqueue::Accepted => panic!("queue of one should be full"),
        }
        // The handed-back reference was the last one.
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn dequeue_is_fifo_and_times_out() {
        let queue = HandoffQueue::new(4);
        for id in 1..=3 {
            assert!(matches!(queue.try_enqueue(array(id)), Enqueue::Accepted));
        }
        for id in 1..=3 {
            match queue.dequeue(Duration::from_millis(10)) {
                Dequeued::Array(a) => assert_eq!(a.unique_id(), id),
                other => panic!("expected array {id}, got {other:?}"),
            }
        }
        assert!(matches!(queue.dequeue(Duration::from_millis(10)), Dequeued::TimedOut));
    }

    #[test]
    fn stop_sentinels_never_take_an_array_slot() {
        let queue = HandoffQueue::new(1);
        queue.push_stop(7);
        queue.push_stop(7);
        assert_eq!(queue.free(), 1);
        assert!(matches!(queue.try_enqueue(array(1)), Enqueue::Accepted));
        assert!(matches!(queue.try_enqueue(array(2)), Enqueue::Dropped(_)));
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.depth(), 1);

        let mut arrays = 0;
        let mut stops = 0;
        for _ in 0..3 {
            match queue.dequeue(Duration::from_millis(10)) {
                Dequeued::Array(a) => {
                    assert_eq!(a.unique_id(), 1);
                    arrays += 1;
                },
                Dequeued::Stop(generation) => {
                    assert_eq!(generation, 7);
                    stops += 1;
                },
                Dequeued::TimedOut => panic!("items were pending"),
            }
        }
        assert_eq!((arrays, stops), (1, 2));
        assert!(matches!(queue.dequeue(Duration::from_millis(10)), Dequeued::TimedOut));
    }

    #[test]
    fn blocked_dequeue_wakes_on_stop() {
        let queue = Arc::new(HandoffQueue::new(2));
        let worker_queue = Arc::clone(&queue);
        let waiter = std::thread::spawn(move || worker_queue.dequeue(Duration::from_secs(10)));

        std::thread::sleep(Duration::from_millis(20));
        queue.push_stop(1);
        let started = std::time::Instant::now();
        assert!(matches!(waiter.join().unwrap(), Dequeued::Stop(1)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn drain_returns_arrays_only() {
        let queue = HandoffQueue::new(4);
        assert!(matches!(queue.try_enqueue(array(1)), Enqueue::Accepted));
        queue.push_stop(0);
        assert!(matches!(queue.try_enqueue(array(2)), Enqueue::Accepted));

        let drained: Vec<u64> = queue.drain().iter().map(|a| a.unique_id()).collect();
        assert_eq!(drained, vec![1, 2]);
        assert_eq!(queue.depth(), 0);
        assert_eq!(queue.discard_stops(), 1);
        assert!(matches!(queue.dequeue(Duration::from_millis(10)), Dequeued::TimedOut));
    }
}
