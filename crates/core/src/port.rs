// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Upstream array ports and callback registration.
//!
//! Anything that produces arrays (a detector driver, or a plugin publishing derived
//! arrays) exposes an [`ArrayPort`]. Consumers register an [`ArrayCallback`] for one
//! address of the port and receive every array published on that address, on the
//! producer's own thread.
//!
//! - [`ArrayPublisher`]: the standard port implementation (subscriber list + publish)
//! - [`PortRegistry`]: name-based lookup of ports, used when a plugin connects to its source

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::array::SharedArray;
use crate::error::{NdKitError, Result};

/// Callback invoked for every array published on a subscribed address.
///
/// The callback receives its own reference to the array; dropping it releases that
/// reference.
pub type ArrayCallback = Arc<dyn Fn(SharedArray) + Send + Sync>;

/// Handle returned by [`ArrayPort::register_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// A source of arrays that plugins can subscribe to.
pub trait ArrayPort: Send + Sync {
    /// Unique port name used for lookup in a [`PortRegistry`].
    fn port_name(&self) -> &str;

    /// Number of addresses served by this port. Valid addresses are `0..max_addr`.
    fn max_addr(&self) -> usize;

    /// Registers `callback` for arrays published on `addr`.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Connection` if `addr` is not served by this port.
    fn register_callback(&self, addr: usize, callback: ArrayCallback) -> Result<SubscriptionId>;

    /// Removes a registration. Returns `false` if the id was unknown.
    ///
    /// Once this returns, the callback is not running and will not be invoked again.
    fn deregister_callback(&self, id: SubscriptionId) -> bool;
}

struct Subscriber {
    id: SubscriptionId,
    addr: usize,
    callback: ArrayCallback,
}

/// Subscriber list plus publication, shared by detectors and plugins.
///
/// Publication holds the subscriber list's read lock while callbacks run, so
/// [`ArrayPort::deregister_callback`] waits for any in-flight delivery to that list
/// and no stale subscriber can be called after deregistration returns. A callback
/// must therefore never deregister itself from inside the delivery.
pub struct ArrayPublisher {
    name: String,
    max_addr: usize,
    next_id: AtomicU64,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl ArrayPublisher {
    pub fn new(name: impl Into<String>, max_addr: usize) -> Self {
        Self {
            name: name.into(),
            max_addr: max_addr.max(1),
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Delivers `array` to every subscriber of `addr`. Returns the number of callbacks invoked.
    pub fn publish(&self, addr: usize, array: &SharedArray) -> usize {
        let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        for subscriber in subscribers.iter().filter(|s| s.addr == addr) {
            (subscriber.callback)(Arc::clone(array));
            delivered += 1;
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl std::fmt::Debug for ArrayPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayPublisher")
            .field("name", &self.name)
            .field("max_addr", &self.max_addr)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ArrayPort for ArrayPublisher {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn max_addr(&self) -> usize {
        self.max_addr
    }

    fn register_callback(&self, addr: usize, callback: ArrayCallback) -> Result<SubscriptionId> {
        if addr >= self.max_addr {
            return Err(NdKitError::Connection(format!(
                "port {} has no address {addr} (max_addr={})",
                self.name, self.max_addr
            )));
        }
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { id, addr, callback });
        tracing::debug!(port = %self.name, addr, subscription = id.0, "Callback registered");
        Ok(id)
    }

    fn deregister_callback(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        let removed = subscribers.len() != before;
        drop(subscribers);
        if removed {
            tracing::debug!(port = %self.name, subscription = id.0, "Callback deregistered");
        }
        removed
    }
}

/// Name-based lookup of array ports.
#[derive(Clone, Default)]
pub struct PortRegistry {
    ports: Arc<RwLock<HashMap<String, Arc<dyn ArrayPort>>>>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a port under its own name.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Configuration` if a port with the same name is already registered.
    pub fn register(&self, port: Arc<dyn ArrayPort>) -> Result<()> {
        let mut ports = self.ports.write().unwrap_or_else(PoisonError::into_inner);
        let name = port.port_name().to_string();
        if ports.contains_key(&name) {
            return Err(NdKitError::Configuration(format!("port {name} is already registered")));
        }
        ports.insert(name, port);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn ArrayPort>> {
        self.ports.write().unwrap_or_else(PoisonError::into_inner).remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ArrayPort>> {
        self.ports.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// Registered port names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.ports.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for PortRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortRegistry").field("ports", &self.names()).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::array::{NDArray, NDDataType};
    use std::sync::atomic::AtomicUsize;

    fn counting_callback(counter: &Arc<AtomicUsize>) -> ArrayCallback {
        let counter = Arc::clone(counter);
        Arc::new(move |_array| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn publish_reaches_only_matching_address() {
        let publisher = ArrayPublisher::new("SIM1", 2);
        let on_zero = Arc::new(AtomicUsize::new(0));
        let on_one = Arc::new(AtomicUsize::new(0));
        publisher.register_callback(0, counting_callback(&on_zero)).unwrap();
        publisher.register_callback(1, counting_callback(&on_one)).unwrap();

        let array = NDArray::zeros(&[4], NDDataType::UInt8).unwrap().into_shared();
        assert_eq!(publisher.publish(0, &array), 1);
        assert_eq!(publisher.publish(0, &array), 1);
        assert_eq!(on_zero.load(Ordering::SeqCst), 2);
        assert_eq!(on_one.load(Ordering::SeqCst), 0);

        // Callbacks dropped their clones.
        assert_eq!(Arc::strong_count(&array), 1);
    }

    #[test]
    fn deregistered_callback_is_not_invoked() {
        let publisher = ArrayPublisher::new("SIM1", 1);
        let hits = Arc::new(AtomicUsize::new(0));
        let id = publisher.register_callback(0, counting_callback(&hits)).unwrap();

        assert!(publisher.deregister_callback(id));
        assert!(!publisher.deregister_callback(id));

        let array = NDArray::zeros(&[1], NDDataType::UInt8).unwrap().into_shared();
        assert_eq!(publisher.publish(0, &array), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn register_rejects_unknown_address() {
        let publisher = ArrayPublisher::new("SIM1", 1);
        let err = publisher.register_callback(3, Arc::new(|_| {})).unwrap_err();
        assert!(matches!(err, NdKitError::Connection(_)));
    }

    #[test]
    fn registry_lookup_and_duplicates() {
        let registry = PortRegistry::new();
        registry.register(Arc::new(ArrayPublisher::new("SIM1", 1))).unwrap();
        assert!(registry.register(Arc::new(ArrayPublisher::new("SIM1", 1))).is_err());
        assert_eq!(registry.get("SIM1").unwrap().port_name(), "SIM1");
        assert!(registry.get("SIM2").is_none());

        registry.unregister("SIM1");
        assert!(registry.names().is_empty());
    }
}
