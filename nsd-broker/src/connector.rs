// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Client-facing glue: broker handle and per-client connector

use crate::messages::BrokerMessage;
use nsd_core::{ClientCallback, ListenerKey, ServiceInfo};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

static NEXT_CONNECTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectorId(u64);

impl ConnectorId {
    fn allocate() -> Self {
        ConnectorId(NEXT_CONNECTOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cloneable entry point to a running broker.
///
/// The IPC layer holds one of these and creates a [`Connector`] per client
/// connection.
#[derive(Clone)]
pub struct BrokerHandle {
    tx: mpsc::UnboundedSender<BrokerMessage>,
}

impl BrokerHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<BrokerMessage>) -> Self {
        Self { tx }
    }

    /// Register a new client and return its connector.
    ///
    /// Dropping the returned connector is the death notification: it
    /// unregisters the client and expunges all its outstanding requests.
    pub fn connect(&self, callback: Arc<dyn ClientCallback>) -> Connector {
        let connector = ConnectorId::allocate();
        let _ = self.tx.send(BrokerMessage::RegisterClient {
            connector,
            callback,
        });
        Connector {
            id: connector,
            tx: self.tx.clone(),
        }
    }
}

/// Per-client handle for issuing operations.
///
/// Every call is asynchronous: the synchronous part only enqueues a message,
/// and results arrive through the client's [`ClientCallback`] under the
/// given listener key. Sends to a stopped broker are silently dropped.
pub struct Connector {
    id: ConnectorId,
    tx: mpsc::UnboundedSender<BrokerMessage>,
}

impl Connector {
    pub fn id(&self) -> ConnectorId {
        self.id
    }

    pub fn discover_services(&self, listener_key: ListenerKey, info: ServiceInfo) {
        let _ = self.tx.send(BrokerMessage::DiscoverServices {
            connector: self.id,
            listener_key,
            info,
        });
    }

    pub fn stop_discovery(&self, listener_key: ListenerKey) {
        let _ = self.tx.send(BrokerMessage::StopDiscovery {
            connector: self.id,
            listener_key,
        });
    }

    pub fn register_service(&self, listener_key: ListenerKey, info: ServiceInfo) {
        let _ = self.tx.send(BrokerMessage::RegisterService {
            connector: self.id,
            listener_key,
            info,
        });
    }

    pub fn unregister_service(&self, listener_key: ListenerKey) {
        let _ = self.tx.send(BrokerMessage::UnregisterService {
            connector: self.id,
            listener_key,
        });
    }

    pub fn resolve_service(&self, listener_key: ListenerKey, info: ServiceInfo) {
        let _ = self.tx.send(BrokerMessage::ResolveService {
            connector: self.id,
            listener_key,
            info,
        });
    }

    pub fn stop_resolution(&self, listener_key: ListenerKey) {
        let _ = self.tx.send(BrokerMessage::StopResolution {
            connector: self.id,
            listener_key,
        });
    }

    /// Start watching a service for updates. Results arrive as
    /// `on_service_updated` / `on_service_updated_lost`.
    pub fn register_service_info_callback(&self, listener_key: ListenerKey, info: ServiceInfo) {
        let _ = self.tx.send(BrokerMessage::RegisterServiceCallback {
            connector: self.id,
            listener_key,
            info,
        });
    }

    pub fn unregister_service_info_callback(&self, listener_key: ListenerKey) {
        let _ = self.tx.send(BrokerMessage::UnregisterServiceCallback {
            connector: self.id,
            listener_key,
        });
    }

    /// Legacy-client entrypoint: keep the daemon running for the lifetime of
    /// this connection.
    pub fn start_daemon(&self) {
        let _ = self
            .tx
            .send(BrokerMessage::DaemonStartup { connector: self.id });
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        let _ = self
            .tx
            .send(BrokerMessage::UnregisterClient { connector: self.id });
    }
}
