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

//! Interfaces to the managed in-process mDNS engine
//!
//! The managed engine is composed of a discovery manager (browse + resolve),
//! an advertiser, and a multi-network socket provider. The broker drives all
//! three through the traits below and receives their callbacks through the
//! event sinks, which forward into the broker's message queue.

use crate::error::FailureCode;
use crate::ids::{ListenerKey, TransactionId};
use crate::network::NetworkHandle;
use crate::service_info::ServiceInfo;
use std::fmt;
use std::sync::Arc;

/// Search options for a discovery manager listener.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Restrict the search to one network; `None` searches all of them.
    pub network: Option<NetworkHandle>,

    /// Rely on ambient traffic instead of aggressive active queries.
    pub passive_mode: bool,

    /// Only resolve this instance name (resolution listeners).
    pub resolve_instance_name: Option<String>,
}

/// Service data reported by the managed engine.
#[derive(Debug, Clone, Default)]
pub struct ManagedServiceInfo {
    pub instance_name: String,
    pub port: u16,
    /// TXT attributes in wire order. Keys are validated by the broker, not
    /// by the engine.
    pub attributes: Vec<(String, Vec<u8>)>,
    pub ipv4_address: Option<String>,
    pub ipv6_address: Option<String>,
    pub network: Option<NetworkHandle>,
    pub interface_index: u32,
}

/// What a managed engine callback reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagedEventKind {
    ServiceFound,
    ServiceLost,
    ResolveSucceeded,
}

/// A managed engine callback, tagged with the transaction id of the listener
/// that produced it.
#[derive(Debug, Clone)]
pub struct ManagedEvent {
    pub transaction_id: TransactionId,
    pub kind: ManagedEventKind,
    /// Listener key of the client operation the listener belongs to.
    pub client_id: ListenerKey,
    /// Service type as the client requested it (not canonicalized, no
    /// `.local` suffix).
    pub requested_service_type: String,
    pub service: ManagedServiceInfo,
}

/// Receives managed engine events.
pub trait ManagedEventSink: Send + Sync {
    fn deliver(&self, event: ManagedEvent);
}

/// Whether a listener browses for services or resolves one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Discovery,
    Resolution,
}

/// A listener registered with the discovery manager.
///
/// Carries everything needed to translate engine callbacks back into broker
/// events: the owning client's listener key, the broker transaction id, the
/// requested service type, and the service type actually listened on.
#[derive(Clone)]
pub struct ManagedListener {
    kind: ListenerKind,
    client_id: ListenerKey,
    transaction_id: TransactionId,
    requested_service_type: String,
    listened_service_type: String,
    sink: Arc<dyn ManagedEventSink>,
}

impl ManagedListener {
    pub fn new(
        kind: ListenerKind,
        client_id: ListenerKey,
        transaction_id: TransactionId,
        requested_service_type: String,
        listened_service_type: String,
        sink: Arc<dyn ManagedEventSink>,
    ) -> Self {
        Self {
            kind,
            client_id,
            transaction_id,
            requested_service_type,
            listened_service_type,
            sink,
        }
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub fn listened_service_type(&self) -> &str {
        &self.listened_service_type
    }

    /// A service name matching the search appeared. Discovery listeners only.
    pub fn on_service_name_discovered(&self, service: ManagedServiceInfo) {
        if self.kind != ListenerKind::Discovery {
            return;
        }
        self.post(ManagedEventKind::ServiceFound, service);
    }

    /// A previously discovered service name disappeared. Discovery listeners
    /// only.
    pub fn on_service_name_removed(&self, service: ManagedServiceInfo) {
        if self.kind != ListenerKind::Discovery {
            return;
        }
        self.post(ManagedEventKind::ServiceLost, service);
    }

    /// The requested instance was fully resolved. Resolution listeners only.
    pub fn on_service_found(&self, service: ManagedServiceInfo) {
        if self.kind != ListenerKind::Resolution {
            return;
        }
        self.post(ManagedEventKind::ResolveSucceeded, service);
    }

    fn post(&self, kind: ManagedEventKind, service: ManagedServiceInfo) {
        self.sink.deliver(ManagedEvent {
            transaction_id: self.transaction_id,
            kind,
            client_id: self.client_id,
            requested_service_type: self.requested_service_type.clone(),
            service,
        });
    }
}

impl fmt::Debug for ManagedListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedListener")
            .field("kind", &self.kind)
            .field("client_id", &self.client_id)
            .field("transaction_id", &self.transaction_id)
            .field("listened_service_type", &self.listened_service_type)
            .finish_non_exhaustive()
    }
}

/// The managed discovery manager: browse and resolve.
pub trait DiscoveryManager: Send {
    fn register_listener(
        &mut self,
        service_type: &str,
        listener: &ManagedListener,
        options: SearchOptions,
    );

    fn unregister_listener(&mut self, service_type: &str, listener: &ManagedListener);
}

/// Advertiser callback results.
#[derive(Debug, Clone)]
pub enum AdvertiserEvent {
    RegisterSucceeded {
        id: TransactionId,
        /// The info actually advertised; only the service name is reported
        /// back to clients.
        info: ServiceInfo,
    },
    RegisterFailed {
        id: TransactionId,
        error: FailureCode,
    },
}

/// Receives advertiser events.
pub trait AdvertiserEventSink: Send + Sync {
    fn deliver(&self, event: AdvertiserEvent);
}

/// The managed advertiser. Tracks its own per-service state keyed by the
/// broker transaction id.
pub trait Advertiser: Send {
    /// Install the sink for registration results. Called once, before any
    /// service is added.
    fn register_callback(&mut self, sink: Arc<dyn AdvertiserEventSink>);

    fn add_service(&mut self, id: TransactionId, info: ServiceInfo);

    fn remove_service(&mut self, id: TransactionId);
}

/// The multi-network socket provider backing the managed engine.
pub trait SocketProvider: Send {
    fn start_monitoring_sockets(&mut self);

    fn stop_monitoring_sockets(&mut self);
}
