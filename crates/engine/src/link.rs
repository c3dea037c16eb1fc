// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A plugin's subscription to its upstream array port.

use ndkit_core::{
    state_helpers, ArrayCallback, ArrayPort, LinkState, NdKitError, PluginStateUpdate,
    PortRegistry, Result, SubscriptionId,
};
use std::sync::Arc;
use tokio::sync::mpsc;

enum Subscription {
    Disconnected,
    Connected { port: Arc<dyn ArrayPort>, id: SubscriptionId },
}

/// Connection from a plugin to `(port, addr)`, resolved through a [`PortRegistry`].
///
/// Kept behind the driver's control mutex. Deregistration waits for any delivery in
/// progress on the upstream port, so it must never be called from inside the
/// link's own callback.
pub struct UpstreamLink {
    plugin: String,
    registry: PortRegistry,
    port: String,
    addr: usize,
    callback: ArrayCallback,
    subscription: Subscription,
    state_tx: Option<mpsc::Sender<PluginStateUpdate>>,
}

impl UpstreamLink {
    pub fn new(
        plugin: impl Into<String>,
        registry: PortRegistry,
        port: impl Into<String>,
        addr: usize,
        callback: ArrayCallback,
        state_tx: Option<mpsc::Sender<PluginStateUpdate>>,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            registry,
            port: port.into(),
            addr,
            callback,
            subscription: Subscription::Disconnected,
            state_tx,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub const fn addr(&self) -> usize {
        self.addr
    }

    pub const fn is_connected(&self) -> bool {
        matches!(self.subscription, Subscription::Connected { .. })
    }

    pub fn state(&self) -> LinkState {
        match self.subscription {
            Subscription::Disconnected => LinkState::Disconnected,
            Subscription::Connected { .. } => {
                LinkState::Connected { port: self.port.clone(), addr: self.addr }
            },
        }
    }

    /// Registers with the target port. Does nothing if already connected.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Connection` if the port is not registered or does not
    /// serve the target address. The link stays disconnected.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let port = self.registry.get(&self.port).ok_or_else(|| {
            NdKitError::Connection(format!("{}: array port {} not found", self.plugin, self.port))
        })?;
        if self.addr >= port.max_addr() {
            return Err(NdKitError::Connection(format!(
                "{}: array port {} has no address {} (max_addr={})",
                self.plugin,
                self.port,
                self.addr,
                port.max_addr()
            )));
        }
        let id = port.register_callback(self.addr, Arc::clone(&self.callback))?;
        self.subscription = Subscription::Connected { port, id };

        tracing::info!(plugin = %self.plugin, port = %self.port, addr = self.addr, "Connected to array port");
        state_helpers::emit_link(self.state_tx.as_ref(), &self.plugin, self.state());
        Ok(())
    }

    /// Deregisters from the upstream port. Safe to call when already disconnected.
    pub fn disconnect(&mut self) {
        let Subscription::Connected { port, id } =
            std::mem::replace(&mut self.subscription, Subscription::Disconnected)
        else {
            return;
        };
        if !port.deregister_callback(id) {
            tracing::debug!(plugin = %self.plugin, port = %self.port, "Subscription was already gone");
        }
        tracing::info!(plugin = %self.plugin, port = %self.port, addr = self.addr, "Disconnected from array port");
        state_helpers::emit_link(self.state_tx.as_ref(), &self.plugin, LinkState::Disconnected);
    }

    /// Points the link at `(port, addr)`. When `reconnect` is set the link is
    /// connected to the new target afterwards.
    ///
    /// # Errors
    ///
    /// Returns `NdKitError::Connection` if reconnecting fails. The new target is
    /// kept and the link is left disconnected.
    pub fn retarget(&mut self, port: impl Into<String>, addr: usize, reconnect: bool) -> Result<()> {
        self.disconnect();
        self.port = port.into();
        self.addr = addr;
        if reconnect {
            self.connect()
        } else {
            Ok(())
        }
    }
}

impl Drop for UpstreamLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for UpstreamLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamLink")
            .field("plugin", &self.plugin)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
