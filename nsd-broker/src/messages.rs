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

//! Broker queue messages and engine event forwarding

use crate::connector::ConnectorId;
use nsd_core::legacy::{LegacyEvent, LegacyEventSink};
use nsd_core::managed::{AdvertiserEvent, AdvertiserEventSink, ManagedEvent, ManagedEventSink};
use nsd_core::{ClientCallback, ListenerKey, ServiceInfo};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything the broker reacts to, in one closed set.
///
/// Client calls, engine callbacks, peer deaths and the cleanup tick all
/// enter the event loop as one of these.
pub(crate) enum BrokerMessage {
    RegisterClient {
        connector: ConnectorId,
        callback: Arc<dyn ClientCallback>,
    },
    UnregisterClient {
        connector: ConnectorId,
    },
    DiscoverServices {
        connector: ConnectorId,
        listener_key: ListenerKey,
        info: ServiceInfo,
    },
    StopDiscovery {
        connector: ConnectorId,
        listener_key: ListenerKey,
    },
    RegisterService {
        connector: ConnectorId,
        listener_key: ListenerKey,
        info: ServiceInfo,
    },
    UnregisterService {
        connector: ConnectorId,
        listener_key: ListenerKey,
    },
    ResolveService {
        connector: ConnectorId,
        listener_key: ListenerKey,
        info: ServiceInfo,
    },
    StopResolution {
        connector: ConnectorId,
        listener_key: ListenerKey,
    },
    RegisterServiceCallback {
        connector: ConnectorId,
        listener_key: ListenerKey,
        info: ServiceInfo,
    },
    UnregisterServiceCallback {
        connector: ConnectorId,
        listener_key: ListenerKey,
    },
    /// Sent by legacy clients that manage the daemon lifetime themselves.
    DaemonStartup {
        connector: ConnectorId,
    },
    /// Delayed-stop tick; only the event loop itself enqueues this.
    DaemonCleanup,
    LegacyEngineEvent(LegacyEvent),
    ManagedEngineEvent(ManagedEvent),
    AdvertiserEngineEvent(AdvertiserEvent),
}

impl BrokerMessage {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            BrokerMessage::RegisterClient { .. } => "RegisterClient",
            BrokerMessage::UnregisterClient { .. } => "UnregisterClient",
            BrokerMessage::DiscoverServices { .. } => "DiscoverServices",
            BrokerMessage::StopDiscovery { .. } => "StopDiscovery",
            BrokerMessage::RegisterService { .. } => "RegisterService",
            BrokerMessage::UnregisterService { .. } => "UnregisterService",
            BrokerMessage::ResolveService { .. } => "ResolveService",
            BrokerMessage::StopResolution { .. } => "StopResolution",
            BrokerMessage::RegisterServiceCallback { .. } => "RegisterServiceCallback",
            BrokerMessage::UnregisterServiceCallback { .. } => "UnregisterServiceCallback",
            BrokerMessage::DaemonStartup { .. } => "DaemonStartup",
            BrokerMessage::DaemonCleanup => "DaemonCleanup",
            BrokerMessage::LegacyEngineEvent(_) => "LegacyEngineEvent",
            BrokerMessage::ManagedEngineEvent(_) => "ManagedEngineEvent",
            BrokerMessage::AdvertiserEngineEvent(_) => "AdvertiserEngineEvent",
        }
    }
}

/// Forwards legacy daemon events into the broker queue.
///
/// Installed on the engine when the daemon is started; sends are best-effort
/// because the broker may already be shutting down.
pub(crate) struct LegacyEventForwarder {
    tx: mpsc::UnboundedSender<BrokerMessage>,
}

impl LegacyEventForwarder {
    pub(crate) fn new(tx: mpsc::UnboundedSender<BrokerMessage>) -> Self {
        Self { tx }
    }
}

impl LegacyEventSink for LegacyEventForwarder {
    fn deliver(&self, event: LegacyEvent) {
        let _ = self.tx.send(BrokerMessage::LegacyEngineEvent(event));
    }
}

/// Forwards managed engine events into the broker queue.
pub(crate) struct ManagedEventForwarder {
    tx: mpsc::UnboundedSender<BrokerMessage>,
}

impl ManagedEventForwarder {
    pub(crate) fn new(tx: mpsc::UnboundedSender<BrokerMessage>) -> Self {
        Self { tx }
    }
}

impl ManagedEventSink for ManagedEventForwarder {
    fn deliver(&self, event: ManagedEvent) {
        let _ = self.tx.send(BrokerMessage::ManagedEngineEvent(event));
    }
}

/// Forwards advertiser results into the broker queue.
pub(crate) struct AdvertiserEventForwarder {
    tx: mpsc::UnboundedSender<BrokerMessage>,
}

impl AdvertiserEventForwarder {
    pub(crate) fn new(tx: mpsc::UnboundedSender<BrokerMessage>) -> Self {
        Self { tx }
    }
}

impl AdvertiserEventSink for AdvertiserEventForwarder {
    fn deliver(&self, event: AdvertiserEvent) {
        let _ = self.tx.send(BrokerMessage::AdvertiserEngineEvent(event));
    }
}
