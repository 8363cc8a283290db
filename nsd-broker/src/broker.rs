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

//! The broker event loop and state machine
//!
//! [`NsdBroker`] is the sole owner and sole writer of every piece of broker
//! state: the client registry, the transaction index, the engine lifecycle
//! flags and the id allocator. All inputs arrive as [`BrokerMessage`]s on a
//! single queue and are handled to completion, one at a time; the only
//! suspension points are between messages.
//!
//! The broker has two states. *Enabled* (the initial state) processes all
//! operations. *Default* acts both as the fallback for messages the enabled
//! state does not handle and as the safe sink once the broker is disabled:
//! client operations are answered with synchronous failure callbacks while
//! client registration, peer death and the daemon lifecycle keep working.

use crate::client::{ClientRecord, ClientRequest, LegacyOp};
use crate::config::BrokerConfig;
use crate::connector::{BrokerHandle, ConnectorId};
use crate::labels;
use crate::messages::{
    AdvertiserEventForwarder, BrokerMessage, LegacyEventForwarder, ManagedEventForwarder,
};
use nsd_core::legacy::{AddressPayload, LegacyEngine, LegacyEvent, ResolutionPayload};
use nsd_core::managed::{
    Advertiser, AdvertiserEvent, DiscoveryManager, ListenerKind, ManagedEvent, ManagedEventKind,
    ManagedEventSink, ManagedListener, SearchOptions, SocketProvider,
};
use nsd_core::network::{self, InterfaceResolver, NetworkHandle, IFACE_IDX_ANY};
use nsd_core::{FailureCode, FeatureFlags, ListenerKey, ServiceInfo, StateBroadcaster, TransactionId};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Engine and policy collaborators injected at construction.
pub struct Dependencies {
    pub legacy_engine: Box<dyn LegacyEngine>,
    pub discovery_manager: Box<dyn DiscoveryManager>,
    pub advertiser: Box<dyn Advertiser>,
    pub socket_provider: Box<dyn SocketProvider>,
    pub interface_resolver: Box<dyn InterfaceResolver>,
    pub flags: Box<dyn FeatureFlags>,
    pub broadcaster: Box<dyn StateBroadcaster>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrokerState {
    /// Fallback state: rejects client operations, keeps lifecycle working.
    Default,
    /// Normal operation.
    Enabled,
}

/// The NSD broker.
///
/// Create one with [`NsdBroker::new`], hand the [`BrokerHandle`] to the IPC
/// layer, and drive the loop with [`NsdBroker::run`] (or use
/// [`NsdBroker::spawn`]).
pub struct NsdBroker {
    config: BrokerConfig,
    deps: Dependencies,
    state: BrokerState,

    /// Clients receiving asynchronous callbacks, by connector.
    clients: HashMap<ConnectorId, ClientRecord>,

    /// Reverse index from transaction id to the owning client.
    transactions: HashMap<TransactionId, ConnectorId>,

    daemon_started: bool,
    monitoring_sockets: bool,

    /// Count of connected clients that invoked the daemon-startup
    /// entrypoint.
    legacy_client_count: u32,

    next_id: u32,

    /// Deadline of the pending delayed daemon stop, if armed. At most one is
    /// outstanding; re-arming replaces it.
    cleanup_deadline: Option<Instant>,

    managed_sink: Arc<dyn ManagedEventSink>,
    tx: mpsc::UnboundedSender<BrokerMessage>,
    rx: mpsc::UnboundedReceiver<BrokerMessage>,
}

impl NsdBroker {
    /// Build a broker around the given collaborators.
    ///
    /// Installs the advertiser callback immediately; the legacy event
    /// listener is installed when the daemon is first started.
    pub fn new(mut deps: Dependencies, config: BrokerConfig) -> (Self, BrokerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        deps.advertiser
            .register_callback(Arc::new(AdvertiserEventForwarder::new(tx.clone())));
        let managed_sink: Arc<dyn ManagedEventSink> =
            Arc::new(ManagedEventForwarder::new(tx.clone()));
        let handle = BrokerHandle::new(tx.clone());
        let broker = Self {
            config,
            deps,
            state: BrokerState::Enabled,
            clients: HashMap::new(),
            transactions: HashMap::new(),
            daemon_started: false,
            monitoring_sockets: false,
            legacy_client_count: 0,
            next_id: 0,
            cleanup_deadline: None,
            managed_sink,
            tx,
            rx,
        };
        (broker, handle)
    }

    /// Build, then run on a new task; returns the handle.
    pub fn spawn(deps: Dependencies, config: BrokerConfig) -> BrokerHandle {
        let (broker, handle) = Self::new(deps, config);
        tokio::spawn(broker.run());
        handle
    }

    /// Flip between the enabled state and the fallback state.
    ///
    /// Leaving the enabled state schedules a delayed daemon stop but does
    /// not expunge outstanding requests, and clients are not notified; this
    /// matches the historical behavior.
    pub fn set_enabled(&mut self, enabled: bool) {
        match (self.state, enabled) {
            (BrokerState::Default, true) => {
                self.state = BrokerState::Enabled;
                self.deps.broadcaster.on_nsd_state_changed(true);
            }
            (BrokerState::Enabled, false) => {
                self.state = BrokerState::Default;
                self.schedule_stop();
            }
            _ => {}
        }
    }

    /// Drive the event loop until every handle and connector is gone.
    pub async fn run(mut self) {
        // Sticky broadcast of the state the broker starts in.
        self.deps
            .broadcaster
            .on_nsd_state_changed(self.state == BrokerState::Enabled);

        loop {
            let message = match self.cleanup_deadline {
                Some(deadline) => tokio::select! {
                    message = self.rx.recv() => message,
                    _ = tokio::time::sleep_until(deadline) => Some(BrokerMessage::DaemonCleanup),
                },
                None => self.rx.recv().await,
            };
            let Some(message) = message else {
                break;
            };
            if matches!(message, BrokerMessage::DaemonCleanup) {
                self.cleanup_deadline = None;
            }
            self.handle_message(message);
        }
    }

    /// Human-readable snapshot of the broker state, for diagnostics.
    pub fn dump(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        for record in self.clients.values() {
            let _ = writeln!(out, "Client Info");
            let _ = write!(out, "{record}");
        }
        let _ = writeln!(out, "daemon started: {}", self.daemon_started);
        let _ = writeln!(out, "monitoring sockets: {}", self.monitoring_sockets);
        out
    }

    fn handle_message(&mut self, message: BrokerMessage) {
        log::trace!("processing {} in {:?} state", message.name(), self.state);
        let fallthrough = match self.state {
            BrokerState::Enabled => self.process_enabled(message),
            BrokerState::Default => Some(message),
        };
        if let Some(message) = fallthrough {
            self.process_default(message);
        }
    }

    /// Enabled-state dispatch. Messages it does not handle fall through to
    /// the default-state handlers.
    fn process_enabled(&mut self, message: BrokerMessage) -> Option<BrokerMessage> {
        match message {
            BrokerMessage::DiscoverServices {
                connector,
                listener_key,
                info,
            } => {
                self.handle_discover_services(connector, listener_key, info);
                None
            }
            BrokerMessage::StopDiscovery {
                connector,
                listener_key,
            } => {
                self.handle_stop_discovery(connector, listener_key);
                None
            }
            BrokerMessage::RegisterService {
                connector,
                listener_key,
                info,
            } => {
                self.handle_register_service(connector, listener_key, info);
                None
            }
            BrokerMessage::UnregisterService {
                connector,
                listener_key,
            } => {
                self.handle_unregister_service(connector, listener_key);
                None
            }
            BrokerMessage::ResolveService {
                connector,
                listener_key,
                info,
            } => {
                self.handle_resolve_service(connector, listener_key, info);
                None
            }
            BrokerMessage::StopResolution {
                connector,
                listener_key,
            } => {
                self.handle_stop_resolution(connector, listener_key);
                None
            }
            BrokerMessage::RegisterServiceCallback {
                connector,
                listener_key,
                info,
            } => {
                self.handle_register_service_callback(connector, listener_key, info);
                None
            }
            BrokerMessage::UnregisterServiceCallback {
                connector,
                listener_key,
            } => {
                self.handle_unregister_service_callback(connector, listener_key);
                None
            }
            BrokerMessage::LegacyEngineEvent(event) => {
                self.handle_legacy_event(event);
                None
            }
            BrokerMessage::ManagedEngineEvent(event) => {
                self.handle_managed_event(event);
                None
            }
            BrokerMessage::AdvertiserEngineEvent(event) => {
                self.handle_advertiser_event(event);
                None
            }
            message @ (BrokerMessage::RegisterClient { .. }
            | BrokerMessage::UnregisterClient { .. }
            | BrokerMessage::DaemonStartup { .. }
            | BrokerMessage::DaemonCleanup) => Some(message),
        }
    }

    /// Default-state dispatch: the parent handlers shared by both states,
    /// plus synchronous rejection of client operations.
    fn process_default(&mut self, message: BrokerMessage) {
        match message {
            BrokerMessage::RegisterClient {
                connector,
                callback,
            } => {
                self.clients.insert(connector, ClientRecord::new(callback));
            }
            BrokerMessage::UnregisterClient { connector } => {
                self.handle_unregister_client(connector);
            }
            BrokerMessage::DiscoverServices {
                connector,
                listener_key,
                ..
            } => {
                self.with_client(connector, |record| {
                    record.discover_services_failed(listener_key, FailureCode::InternalError);
                });
            }
            BrokerMessage::StopDiscovery {
                connector,
                listener_key,
            } => {
                self.with_client(connector, |record| {
                    record.stop_discovery_failed(listener_key, FailureCode::InternalError);
                });
            }
            BrokerMessage::RegisterService {
                connector,
                listener_key,
                ..
            } => {
                self.with_client(connector, |record| {
                    record.register_service_failed(listener_key, FailureCode::InternalError);
                });
            }
            BrokerMessage::UnregisterService {
                connector,
                listener_key,
            } => {
                self.with_client(connector, |record| {
                    record.unregister_service_failed(listener_key, FailureCode::InternalError);
                });
            }
            BrokerMessage::ResolveService {
                connector,
                listener_key,
                ..
            } => {
                self.with_client(connector, |record| {
                    record.resolve_service_failed(listener_key, FailureCode::InternalError);
                });
            }
            BrokerMessage::StopResolution {
                connector,
                listener_key,
            } => {
                self.with_client(connector, |record| {
                    record.stop_resolution_failed(listener_key, FailureCode::OperationNotRunning);
                });
            }
            BrokerMessage::RegisterServiceCallback {
                connector,
                listener_key,
                ..
            } => {
                self.with_client(connector, |record| {
                    record.service_info_callback_registration_failed(
                        listener_key,
                        FailureCode::BadParameters,
                    );
                });
            }
            BrokerMessage::DaemonCleanup => {
                self.maybe_stop_daemon();
            }
            BrokerMessage::DaemonStartup { connector } => {
                self.handle_daemon_startup(connector);
            }
            other => {
                log::error!("Unhandled {}", other.name());
            }
        }
    }

    // --- client registry ---

    fn handle_unregister_client(&mut self, connector: ConnectorId) {
        if let Some(mut record) = self.clients.remove(&connector) {
            self.expunge_all_requests(&mut record);
            if record.is_legacy_client {
                self.legacy_client_count -= 1;
            }
        }
        self.maybe_stop_monitoring_sockets_if_no_active_request();
        self.maybe_schedule_stop();
    }

    /// Remove every request of a departing client from the transaction
    /// index, telling the backend that started each one to stop it.
    fn expunge_all_requests(&mut self, record: &mut ClientRecord) {
        for (listener_key, request) in record.requests.drain() {
            let global_id = request.global_id();
            self.transactions.remove(&global_id);
            log::debug!("Terminating listener key {listener_key} global id {global_id}");
            match request {
                ClientRequest::ManagedDiscovery { listener, .. } => {
                    self.deps
                        .discovery_manager
                        .unregister_listener(listener.listened_service_type(), &listener);
                }
                ClientRequest::ManagedAdvertiser { global_id } => {
                    self.deps.advertiser.remove_service(global_id);
                }
                ClientRequest::Legacy { global_id, op } => match op {
                    LegacyOp::Discover => {
                        self.stop_service_discovery(global_id);
                    }
                    LegacyOp::Resolve | LegacyOp::WatchResolve => {
                        self.stop_resolve_service(global_id);
                    }
                    LegacyOp::Register => {
                        self.unregister_service(global_id);
                    }
                },
            }
        }
    }

    fn handle_daemon_startup(&mut self, connector: ConnectorId) {
        let Some(record) = self.clients.get_mut(&connector) else {
            return;
        };
        let newly_legacy = !record.is_legacy_client;
        record.is_legacy_client = true;
        self.cancel_stop();
        if newly_legacy {
            self.legacy_client_count += 1;
        }
        self.maybe_start_daemon();
    }

    fn with_client(&self, connector: ConnectorId, f: impl FnOnce(&ClientRecord)) {
        if let Some(record) = self.clients.get(&connector) {
            f(record);
        }
    }

    fn request_limit_reached(&self, connector: ConnectorId) -> bool {
        let Some(record) = self.clients.get(&connector) else {
            return false;
        };
        if record.requests.len() >= self.config.max_requests_per_client {
            log::debug!("Exceeded max outstanding requests for connector {connector}");
            return true;
        }
        false
    }

    // --- request bookkeeping ---

    fn store_legacy_request(
        &mut self,
        connector: ConnectorId,
        listener_key: ListenerKey,
        global_id: TransactionId,
        op: LegacyOp,
    ) {
        let Some(record) = self.clients.get_mut(&connector) else {
            return;
        };
        record
            .requests
            .insert(listener_key, ClientRequest::Legacy { global_id, op });
        self.transactions.insert(global_id, connector);
        // New legacy work arrived; the daemon must not be torn down.
        self.cancel_stop();
    }

    fn store_discovery_manager_request(
        &mut self,
        connector: ConnectorId,
        listener_key: ListenerKey,
        global_id: TransactionId,
        listener: ManagedListener,
    ) {
        let Some(record) = self.clients.get_mut(&connector) else {
            return;
        };
        record.requests.insert(
            listener_key,
            ClientRequest::ManagedDiscovery {
                global_id,
                listener,
            },
        );
        self.transactions.insert(global_id, connector);
    }

    fn store_advertiser_request(
        &mut self,
        connector: ConnectorId,
        listener_key: ListenerKey,
        global_id: TransactionId,
    ) {
        let Some(record) = self.clients.get_mut(&connector) else {
            return;
        };
        record
            .requests
            .insert(listener_key, ClientRequest::ManagedAdvertiser { global_id });
        self.transactions.insert(global_id, connector);
    }

    fn remove_request(
        &mut self,
        connector: ConnectorId,
        listener_key: ListenerKey,
        global_id: TransactionId,
    ) {
        let Some(record) = self.clients.get_mut(&connector) else {
            return;
        };
        let Some(existing) = record.requests.remove(&listener_key) else {
            return;
        };
        self.transactions.remove(&global_id);
        match existing {
            ClientRequest::Legacy { .. } => self.maybe_schedule_stop(),
            _ => self.maybe_stop_monitoring_sockets_if_no_active_request(),
        }
    }

    fn next_transaction_id(&mut self) -> TransactionId {
        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == TransactionId::INVALID.0 {
            self.next_id = self.next_id.wrapping_add(1);
        }
        TransactionId(self.next_id)
    }

    // --- client operations ---

    fn handle_discover_services(
        &mut self,
        connector: ConnectorId,
        listener_key: ListenerKey,
        info: ServiceInfo,
    ) {
        log::debug!("Discover services");
        if !self.clients.contains_key(&connector) {
            // A death notification may have raced ahead of this call.
            log::error!("Unknown connector in discovery");
            return;
        }
        if self.request_limit_reached(connector) {
            self.with_client(connector, |record| {
                record.discover_services_failed(listener_key, FailureCode::MaxLimit);
            });
            return;
        }

        let id = self.next_transaction_id();
        if self.deps.flags.discovery_manager_enabled() {
            let Some(service_type) = labels::construct_service_type(&info.service_type) else {
                self.with_client(connector, |record| {
                    record.discover_services_failed(listener_key, FailureCode::InternalError);
                });
                return;
            };
            let listened_service_type = format!("{service_type}.local");
            self.maybe_start_monitoring_sockets();
            let listener = ManagedListener::new(
                ListenerKind::Discovery,
                listener_key,
                id,
                info.service_type.clone(),
                listened_service_type.clone(),
                self.managed_sink.clone(),
            );
            let options = SearchOptions {
                network: info.network,
                passive_mode: true,
                resolve_instance_name: None,
            };
            self.deps
                .discovery_manager
                .register_listener(&listened_service_type, &listener, options);
            self.store_discovery_manager_request(connector, listener_key, id, listener);
            self.with_client(connector, |record| {
                record.discover_services_started(listener_key, &info);
            });
        } else {
            self.maybe_start_daemon();
            if self.discover_services(id, &info) {
                log::debug!("Discover {listener_key} {id} {}", info.service_type);
                self.store_legacy_request(connector, listener_key, id, LegacyOp::Discover);
                self.with_client(connector, |record| {
                    record.discover_services_started(listener_key, &info);
                });
            } else {
                self.stop_service_discovery(id);
                self.with_client(connector, |record| {
                    record.discover_services_failed(listener_key, FailureCode::InternalError);
                });
            }
        }
    }

    fn handle_stop_discovery(&mut self, connector: ConnectorId, listener_key: ListenerKey) {
        log::debug!("Stop service discovery");
        let (id, managed_listener) = {
            let Some(record) = self.clients.get(&connector) else {
                log::error!("Unknown connector in stop discovery");
                return;
            };
            let Some(request) = record.requests.get(&listener_key) else {
                log::error!("Unknown client request in stop discovery");
                return;
            };
            let managed_listener = match request {
                ClientRequest::ManagedDiscovery { listener, .. } => Some(listener.clone()),
                _ => None,
            };
            (request.global_id(), managed_listener)
        };

        // The discovery-manager flag may have flipped since the request
        // started; route on the stored request, not on the flag.
        match managed_listener {
            Some(listener) => {
                self.deps
                    .discovery_manager
                    .unregister_listener(listener.listened_service_type(), &listener);
                self.remove_request(connector, listener_key, id);
                self.with_client(connector, |record| {
                    record.stop_discovery_succeeded(listener_key);
                });
            }
            None => {
                self.remove_request(connector, listener_key, id);
                if self.stop_service_discovery(id) {
                    self.with_client(connector, |record| {
                        record.stop_discovery_succeeded(listener_key);
                    });
                } else {
                    self.with_client(connector, |record| {
                        record.stop_discovery_failed(listener_key, FailureCode::InternalError);
                    });
                }
            }
        }
    }

    fn handle_register_service(
        &mut self,
        connector: ConnectorId,
        listener_key: ListenerKey,
        info: ServiceInfo,
    ) {
        log::debug!("Register service");
        if !self.clients.contains_key(&connector) {
            log::error!("Unknown connector in registration");
            return;
        }
        if self.request_limit_reached(connector) {
            self.with_client(connector, |record| {
                record.register_service_failed(listener_key, FailureCode::MaxLimit);
            });
            return;
        }

        let id = self.next_transaction_id();
        if self.deps.flags.advertiser_enabled() {
            let Some(register_service_type) = labels::construct_service_type(&info.service_type)
            else {
                log::error!("Invalid service type: {}", info.service_type);
                self.with_client(connector, |record| {
                    record.register_service_failed(listener_key, FailureCode::InternalError);
                });
                return;
            };
            let mut info = info;
            info.service_type = register_service_type;
            info.service_name = labels::truncate_service_name(&info.service_name);

            self.maybe_start_monitoring_sockets();
            self.deps.advertiser.add_service(id, info);
            self.store_advertiser_request(connector, listener_key, id);
            // The result is reported through the advertiser callback.
        } else {
            self.maybe_start_daemon();
            if self.register_service(id, &info) {
                log::debug!("Register {listener_key} {id}");
                self.store_legacy_request(connector, listener_key, id, LegacyOp::Register);
                // Reply once the daemon reports the registration.
            } else {
                self.unregister_service(id);
                self.with_client(connector, |record| {
                    record.register_service_failed(listener_key, FailureCode::InternalError);
                });
            }
        }
    }

    fn handle_unregister_service(&mut self, connector: ConnectorId, listener_key: ListenerKey) {
        log::debug!("Unregister service");
        let (id, was_advertiser) = {
            let Some(record) = self.clients.get(&connector) else {
                log::error!("Unknown connector in unregistration");
                return;
            };
            let Some(request) = record.requests.get(&listener_key) else {
                log::error!("Unknown client request in unregister service");
                return;
            };
            (
                request.global_id(),
                matches!(request, ClientRequest::ManagedAdvertiser { .. }),
            )
        };
        self.remove_request(connector, listener_key, id);

        // The advertiser flag may have flipped since the request started;
        // route on the stored request, not on the flag.
        if was_advertiser {
            self.deps.advertiser.remove_service(id);
            self.with_client(connector, |record| {
                record.unregister_service_succeeded(listener_key);
            });
        } else if self.unregister_service(id) {
            self.with_client(connector, |record| {
                record.unregister_service_succeeded(listener_key);
            });
        } else {
            self.with_client(connector, |record| {
                record.unregister_service_failed(listener_key, FailureCode::InternalError);
            });
        }
    }

    fn handle_resolve_service(
        &mut self,
        connector: ConnectorId,
        listener_key: ListenerKey,
        info: ServiceInfo,
    ) {
        log::debug!("Resolve service");
        if !self.clients.contains_key(&connector) {
            log::error!("Unknown connector in resolution");
            return;
        }

        let id = self.next_transaction_id();
        if self.deps.flags.discovery_manager_enabled() {
            let Some(service_type) = labels::construct_service_type(&info.service_type) else {
                self.with_client(connector, |record| {
                    record.resolve_service_failed(listener_key, FailureCode::InternalError);
                });
                return;
            };
            let resolve_service_type = format!("{service_type}.local");

            self.maybe_start_monitoring_sockets();
            let listener = ManagedListener::new(
                ListenerKind::Resolution,
                listener_key,
                id,
                info.service_type.clone(),
                resolve_service_type.clone(),
                self.managed_sink.clone(),
            );
            let options = SearchOptions {
                network: info.network,
                passive_mode: true,
                resolve_instance_name: Some(info.service_name.clone()),
            };
            self.deps
                .discovery_manager
                .register_listener(&resolve_service_type, &listener, options);
            self.store_discovery_manager_request(connector, listener_key, id, listener);
        } else {
            let already_active = self
                .clients
                .get(&connector)
                .is_some_and(|record| record.resolved_service.is_some());
            if already_active {
                self.with_client(connector, |record| {
                    record.resolve_service_failed(listener_key, FailureCode::AlreadyActive);
                });
                return;
            }

            self.maybe_start_daemon();
            if self.resolve_service(id, &info) {
                if let Some(record) = self.clients.get_mut(&connector) {
                    record.resolved_service = Some(ServiceInfo::default());
                }
                self.store_legacy_request(connector, listener_key, id, LegacyOp::Resolve);
            } else {
                self.with_client(connector, |record| {
                    record.resolve_service_failed(listener_key, FailureCode::InternalError);
                });
            }
        }
    }

    fn handle_stop_resolution(&mut self, connector: ConnectorId, listener_key: ListenerKey) {
        log::debug!("Stop service resolution");
        let (id, managed_listener) = {
            let Some(record) = self.clients.get(&connector) else {
                log::error!("Unknown connector in stop resolution");
                return;
            };
            let Some(request) = record.requests.get(&listener_key) else {
                log::error!("Unknown client request in stop resolution");
                return;
            };
            let managed_listener = match request {
                ClientRequest::ManagedDiscovery { listener, .. } => Some(listener.clone()),
                _ => None,
            };
            (request.global_id(), managed_listener)
        };

        match managed_listener {
            Some(listener) => {
                self.deps
                    .discovery_manager
                    .unregister_listener(listener.listened_service_type(), &listener);
                self.remove_request(connector, listener_key, id);
                self.with_client(connector, |record| {
                    record.stop_resolution_succeeded(listener_key);
                });
            }
            None => {
                self.remove_request(connector, listener_key, id);
                if self.stop_resolve_service(id) {
                    self.with_client(connector, |record| {
                        record.stop_resolution_succeeded(listener_key);
                    });
                } else {
                    self.with_client(connector, |record| {
                        record.stop_resolution_failed(
                            listener_key,
                            FailureCode::OperationNotRunning,
                        );
                    });
                }
            }
        }
        if let Some(record) = self.clients.get_mut(&connector) {
            record.resolved_service = None;
        }
    }

    fn handle_register_service_callback(
        &mut self,
        connector: ConnectorId,
        listener_key: ListenerKey,
        info: ServiceInfo,
    ) {
        log::debug!("Register a service callback");
        let Some(record) = self.clients.get(&connector) else {
            log::error!("Unknown connector in callback registration");
            return;
        };
        if record.watched_service.is_some() {
            record.service_info_callback_registration_failed(
                listener_key,
                FailureCode::AlreadyActive,
            );
            return;
        }

        self.maybe_start_daemon();
        let id = self.next_transaction_id();
        if self.resolve_service(id, &info) {
            if let Some(record) = self.clients.get_mut(&connector) {
                record.watched_service = Some(ServiceInfo::default());
                record.watched_listener_key = Some(listener_key);
            }
            self.store_legacy_request(connector, listener_key, id, LegacyOp::WatchResolve);
        } else {
            self.with_client(connector, |record| {
                record.service_info_callback_registration_failed(
                    listener_key,
                    FailureCode::BadParameters,
                );
            });
        }
    }

    fn handle_unregister_service_callback(
        &mut self,
        connector: ConnectorId,
        listener_key: ListenerKey,
    ) {
        log::debug!("Unregister a service callback");
        let id = {
            let Some(record) = self.clients.get(&connector) else {
                log::error!("Unknown connector in callback unregistration");
                return;
            };
            let Some(request) = record.requests.get(&listener_key) else {
                log::error!("Unknown client request in callback unregistration");
                return;
            };
            request.global_id()
        };
        self.remove_request(connector, listener_key, id);
        if self.stop_resolve_service(id) {
            self.with_client(connector, |record| {
                record.service_info_callback_unregistered(listener_key);
            });
        } else {
            log::error!("Failed to unregister service info callback");
        }
        if let Some(record) = self.clients.get_mut(&connector) {
            record.clear_watched_service();
        }
    }

    // --- legacy engine events ---

    fn handle_legacy_event(&mut self, event: LegacyEvent) {
        let id = event.transaction_id();
        let Some(&connector) = self.transactions.get(&id) else {
            log::error!("Transaction {id} for {} has no client mapping", event.name());
            return;
        };
        let Some(listener_key) = self
            .clients
            .get(&connector)
            .and_then(|record| record.listener_key_for(id))
        else {
            // Engine callbacks race with stops; the listener is already
            // gone.
            log::debug!("{} for transaction {id} that is no longer active", event.name());
            return;
        };
        log::debug!("Legacy daemon event {} id={id}", event.name());

        match event {
            LegacyEvent::ServiceFound { discovery, .. } => {
                if discovery.net_id == network::NETID_UNSET {
                    // Services without a network are not usable by clients.
                    return;
                }
                if discovery.net_id == network::DUMMY_NET_ID {
                    // Only seen when discovering locally advertised
                    // services; not reachable through that interface.
                    return;
                }
                let mut info =
                    ServiceInfo::new(&discovery.service_name, &discovery.registration_type);
                set_service_network_for_callback(
                    &mut info,
                    discovery.net_id,
                    discovery.interface_index,
                );
                self.with_client(connector, |record| {
                    record.service_found(listener_key, &info);
                });
            }
            LegacyEvent::ServiceLost { discovery, .. } => {
                // The network may already be torn down when the service is
                // lost; the callback then carries no network.
                let mut info =
                    ServiceInfo::new(&discovery.service_name, &discovery.registration_type);
                set_service_network_for_callback(
                    &mut info,
                    discovery.net_id,
                    discovery.interface_index,
                );
                self.with_client(connector, |record| {
                    record.service_lost(listener_key, &info);
                    record.maybe_notify_watched_service_lost(&info);
                });
            }
            LegacyEvent::DiscoveryFailed { .. } => {
                self.with_client(connector, |record| {
                    record.discover_services_failed(listener_key, FailureCode::InternalError);
                });
            }
            LegacyEvent::ServiceRegistered { registration, .. } => {
                // Only the registered name is reported back.
                let info = ServiceInfo::new(&registration.service_name, "");
                self.with_client(connector, |record| {
                    record.register_service_succeeded(listener_key, &info);
                });
            }
            LegacyEvent::RegistrationFailed { .. } => {
                self.with_client(connector, |record| {
                    record.register_service_failed(listener_key, FailureCode::InternalError);
                });
            }
            LegacyEvent::ServiceResolved { resolution, .. } => {
                self.handle_service_resolved(connector, listener_key, id, resolution);
            }
            LegacyEvent::ResolutionFailed { .. } => {
                self.stop_resolve_service(id);
                self.remove_request(connector, listener_key, id);
                self.notify_resolve_failed(connector, listener_key, FailureCode::BadParameters);
            }
            LegacyEvent::GetAddressFailed { .. } => {
                self.stop_get_addr_info(id);
                self.remove_request(connector, listener_key, id);
                self.notify_resolve_failed(connector, listener_key, FailureCode::BadParameters);
            }
            LegacyEvent::GetAddressSucceeded { address, .. } => {
                self.handle_get_address_succeeded(connector, listener_key, id, address);
            }
        }
    }

    /// First stage of a legacy resolve completed: record what the daemon
    /// reported and chase the host address under a fresh transaction id,
    /// kept under the same listener key.
    fn handle_service_resolved(
        &mut self,
        connector: ConnectorId,
        listener_key: ListenerKey,
        id: TransactionId,
        resolution: ResolutionPayload,
    ) {
        let Some((name, bare_type)) =
            labels::split_resolved_full_name(&resolution.service_full_name)
        else {
            log::error!("Invalid service found {}", resolution.service_full_name);
            return;
        };
        // Resolved types carry a leading dot, matching historical output.
        let service_type = format!(".{bare_type}");

        let is_watch;
        {
            let Some(record) = self.clients.get_mut(&connector) else {
                return;
            };
            is_watch = record.watched_listener_key == Some(listener_key);
            let scratch = if is_watch {
                record.watched_service.as_mut()
            } else {
                record.resolved_service.as_mut()
            };
            let Some(service) = scratch else {
                log::error!("Resolved event for transaction {id} without a pending resolve");
                return;
            };
            service.service_name = name;
            service.service_type = service_type;
            service.port = Some(resolution.port);
            service.txt_attributes = resolution.txt_attributes;
            // The network is filled in by the address lookup.
        }

        self.stop_resolve_service(id);
        self.remove_request(connector, listener_key, id);

        let second_id = self.next_transaction_id();
        if self.get_addr_info(second_id, &resolution.hostname, resolution.interface_index) {
            let op = if is_watch {
                LegacyOp::WatchResolve
            } else {
                LegacyOp::Resolve
            };
            self.store_legacy_request(connector, listener_key, second_id, op);
        } else {
            self.notify_resolve_failed(connector, listener_key, FailureCode::BadParameters);
        }
    }

    fn handle_get_address_succeeded(
        &mut self,
        connector: ConnectorId,
        listener_key: ListenerKey,
        id: TransactionId,
        address: AddressPayload,
    ) {
        let host: Option<IpAddr> = match address.address.parse() {
            Ok(host) => Some(host),
            Err(_) => {
                log::error!("Invalid host in address lookup success: {}", address.address);
                None
            }
        };
        // A service on an interface without a network is not usable by
        // clients; treat that as a failure.
        let usable_host = if address.net_id != network::NETID_UNSET {
            host
        } else {
            None
        };

        let is_watch = self
            .clients
            .get(&connector)
            .is_some_and(|record| record.watched_listener_key == Some(listener_key));

        if is_watch {
            match usable_host {
                Some(host) => {
                    let Some(record) = self.clients.get_mut(&connector) else {
                        return;
                    };
                    let snapshot = record.watched_service.as_mut().map(|watched| {
                        set_service_network_for_callback(
                            watched,
                            address.net_id,
                            address.interface_index,
                        );
                        watched.host_addresses.push(host);
                        watched.clone()
                    });
                    if let Some(snapshot) = snapshot {
                        record.service_updated(listener_key, &snapshot);
                    }
                    // The lookup stays active and keeps reporting updates.
                }
                None => {
                    self.stop_get_addr_info(id);
                    self.remove_request(connector, listener_key, id);
                    if let Some(record) = self.clients.get_mut(&connector) {
                        record.clear_watched_service();
                        record.service_info_callback_registration_failed(
                            listener_key,
                            FailureCode::BadParameters,
                        );
                    }
                }
            }
        } else {
            if let Some(record) = self.clients.get_mut(&connector) {
                match usable_host {
                    Some(host) => {
                        let snapshot = record.resolved_service.as_mut().map(|resolved| {
                            resolved.host_addresses = vec![host];
                            set_service_network_for_callback(
                                resolved,
                                address.net_id,
                                address.interface_index,
                            );
                            resolved.clone()
                        });
                        if let Some(snapshot) = snapshot {
                            record.resolve_service_succeeded(listener_key, &snapshot);
                        }
                    }
                    None => {
                        record.resolve_service_failed(listener_key, FailureCode::InternalError);
                    }
                }
            }
            self.stop_get_addr_info(id);
            self.remove_request(connector, listener_key, id);
            if let Some(record) = self.clients.get_mut(&connector) {
                record.resolved_service = None;
            }
        }
    }

    fn notify_resolve_failed(
        &mut self,
        connector: ConnectorId,
        listener_key: ListenerKey,
        error: FailureCode,
    ) {
        let Some(record) = self.clients.get_mut(&connector) else {
            return;
        };
        if record.watched_listener_key == Some(listener_key) {
            record.service_info_callback_registration_failed(listener_key, error);
            record.clear_watched_service();
        } else {
            // The resolve API historically reported only internal-error.
            record.resolve_service_failed(listener_key, FailureCode::InternalError);
            record.resolved_service = None;
        }
    }

    // --- managed engine events ---

    fn handle_managed_event(&mut self, event: ManagedEvent) {
        let Some(&connector) = self.transactions.get(&event.transaction_id) else {
            log::error!(
                "Transaction {} for {:?} has no client mapping",
                event.transaction_id,
                event.kind
            );
            return;
        };
        let listener_key = event.client_id;
        log::debug!(
            "Managed engine event {:?} transaction={}",
            event.kind,
            event.transaction_id
        );
        let info = build_service_info_from_managed(&event);

        match event.kind {
            ManagedEventKind::ServiceFound => {
                self.with_client(connector, |record| {
                    record.service_found(listener_key, &info);
                });
            }
            ManagedEventKind::ServiceLost => {
                self.with_client(connector, |record| {
                    record.service_lost(listener_key, &info);
                    record.maybe_notify_watched_service_lost(&info);
                });
            }
            ManagedEventKind::ResolveSucceeded => {
                self.handle_managed_resolve_succeeded(connector, event, info);
            }
        }
    }

    fn handle_managed_resolve_succeeded(
        &mut self,
        connector: ConnectorId,
        event: ManagedEvent,
        mut info: ServiceInfo,
    ) {
        let listener_key = event.client_id;
        {
            let Some(record) = self.clients.get(&connector) else {
                return;
            };
            if !record.requests.contains_key(&listener_key) {
                log::error!("Unknown client request in managed resolve success");
                return;
            }

            // Leading dot on the type aligns with the legacy resolver
            // output.
            info.service_type = format!(".{}", event.requested_service_type);
            info.port = Some(event.service.port);
            for (key, value) in &event.service.attributes {
                if let Err(e) = info.set_attribute(key, value.clone()) {
                    log::error!("Invalid attribute: {e}");
                }
            }

            let address = event
                .service
                .ipv4_address
                .as_deref()
                .or(event.service.ipv6_address.as_deref());
            match address.and_then(|a| a.parse::<IpAddr>().ok()) {
                Some(host) => {
                    info.host_addresses = vec![host];
                    record.resolve_service_succeeded(listener_key, &info);
                }
                None => {
                    log::error!("Invalid address in managed resolve success: {address:?}");
                    record.resolve_service_failed(listener_key, FailureCode::InternalError);
                }
            }
        }

        // One-shot: unregister the listener immediately, like the legacy
        // resolver does.
        let listener = {
            let Some(record) = self.clients.get(&connector) else {
                return;
            };
            match record.requests.get(&listener_key) {
                Some(ClientRequest::ManagedDiscovery { listener, .. }) => listener.clone(),
                _ => {
                    log::error!("Non-managed request in managed engine event");
                    return;
                }
            }
        };
        self.deps
            .discovery_manager
            .unregister_listener(listener.listened_service_type(), &listener);
        self.remove_request(connector, listener_key, event.transaction_id);
    }

    fn handle_advertiser_event(&mut self, event: AdvertiserEvent) {
        match event {
            AdvertiserEvent::RegisterSucceeded { id, info } => {
                let Some((connector, listener_key)) = self.client_for_transaction(id) else {
                    return;
                };
                // Only the registered name is reported back.
                let callback_info = ServiceInfo::new(&info.service_name, "");
                self.with_client(connector, |record| {
                    record.register_service_succeeded(listener_key, &callback_info);
                });
            }
            AdvertiserEvent::RegisterFailed { id, error } => {
                let Some((connector, listener_key)) = self.client_for_transaction(id) else {
                    return;
                };
                self.with_client(connector, |record| {
                    record.register_service_failed(listener_key, error);
                });
            }
        }
    }

    fn client_for_transaction(&self, id: TransactionId) -> Option<(ConnectorId, ListenerKey)> {
        let Some(&connector) = self.transactions.get(&id) else {
            log::error!("Callback for service {id} has no client");
            return None;
        };
        let Some(listener_key) = self
            .clients
            .get(&connector)
            .and_then(|record| record.listener_key_for(id))
        else {
            log::error!("Client listener key not found for service {id}");
            return None;
        };
        Some((connector, listener_key))
    }

    // --- legacy engine primitives ---

    fn register_service(&mut self, id: TransactionId, service: &ServiceInfo) -> bool {
        log::debug!("register_service: {id} {service:?}");
        let interface_index = self.network_interface_index(service);
        if service.network.is_some() && interface_index == IFACE_IDX_ANY {
            log::error!("Interface to register service on not found");
            return false;
        }
        self.deps.legacy_engine.register_service(
            id,
            &service.service_name,
            &service.service_type,
            service.port.unwrap_or(0),
            &service.txt_attributes,
            interface_index,
        )
    }

    fn unregister_service(&mut self, id: TransactionId) -> bool {
        self.deps.legacy_engine.stop_operation(id)
    }

    fn discover_services(&mut self, id: TransactionId, service: &ServiceInfo) -> bool {
        let interface_index = self.network_interface_index(service);
        if service.network.is_some() && interface_index == IFACE_IDX_ANY {
            log::error!("Interface to discover service on not found");
            return false;
        }
        self.deps
            .legacy_engine
            .discover(id, &service.service_type, interface_index)
    }

    fn stop_service_discovery(&mut self, id: TransactionId) -> bool {
        self.deps.legacy_engine.stop_operation(id)
    }

    fn resolve_service(&mut self, id: TransactionId, service: &ServiceInfo) -> bool {
        let interface_index = self.network_interface_index(service);
        if service.network.is_some() && interface_index == IFACE_IDX_ANY {
            log::error!("Interface to resolve service on not found");
            return false;
        }
        self.deps.legacy_engine.resolve(
            id,
            &service.service_name,
            &service.service_type,
            "local.",
            interface_index,
        )
    }

    fn stop_resolve_service(&mut self, id: TransactionId) -> bool {
        self.deps.legacy_engine.stop_operation(id)
    }

    fn get_addr_info(&mut self, id: TransactionId, hostname: &str, interface_index: u32) -> bool {
        self.deps
            .legacy_engine
            .get_service_address(id, hostname, interface_index)
    }

    fn stop_get_addr_info(&mut self, id: TransactionId) -> bool {
        self.deps.legacy_engine.stop_operation(id)
    }

    /// Guess the interface to use for a request scoped to a network.
    ///
    /// Imperfect by design: the network may be gone or not yet fully
    /// registered, and failing the request is then the correct outcome.
    /// With no network, a previously recorded interface index is used so a
    /// follow-up operation stays on the interface the service was seen on.
    fn network_interface_index(&self, service: &ServiceInfo) -> u32 {
        let Some(network) = service.network else {
            if service.interface_index != 0 {
                return service.interface_index;
            }
            return IFACE_IDX_ANY;
        };
        self.deps.interface_resolver.interface_index_for(network)
    }

    // --- daemon and socket lifecycle ---

    fn maybe_start_daemon(&mut self) {
        if self.daemon_started {
            log::debug!("Daemon is already started.");
            return;
        }
        self.deps
            .legacy_engine
            .register_event_listener(Arc::new(LegacyEventForwarder::new(self.tx.clone())));
        self.deps.legacy_engine.start_daemon();
        self.daemon_started = true;
        self.maybe_schedule_stop();
    }

    fn maybe_stop_daemon(&mut self) {
        if !self.daemon_started {
            log::debug!("Daemon has not been started.");
            return;
        }
        self.deps.legacy_engine.unregister_event_listener();
        self.deps.legacy_engine.stop_daemon();
        self.daemon_started = false;
    }

    fn is_any_request_active(&self) -> bool {
        !self.transactions.is_empty()
    }

    fn schedule_stop(&mut self) {
        self.cleanup_deadline = Some(Instant::now() + self.config.cleanup_delay);
    }

    /// The daemon must stay alive while work is outstanding or any legacy
    /// client is connected.
    fn maybe_schedule_stop(&mut self) {
        if !self.is_any_request_active() && self.legacy_client_count == 0 {
            self.schedule_stop();
        }
    }

    fn cancel_stop(&mut self) {
        self.cleanup_deadline = None;
    }

    fn maybe_start_monitoring_sockets(&mut self) {
        if self.monitoring_sockets {
            log::debug!("Socket monitoring is already started.");
            return;
        }
        self.deps.socket_provider.start_monitoring_sockets();
        self.monitoring_sockets = true;
    }

    fn maybe_stop_monitoring_sockets_if_no_active_request(&mut self) {
        if !self.monitoring_sockets {
            return;
        }
        if self.is_any_request_active() {
            return;
        }
        self.deps.socket_provider.stop_monitoring_sockets();
        self.monitoring_sockets = false;
    }
}

/// Translate a raw engine net id into the network (or recorded interface)
/// reported to clients.
fn set_service_network_for_callback(info: &mut ServiceInfo, net_id: u32, interface_index: u32) {
    match net_id {
        network::NETID_UNSET => {
            info.network = None;
        }
        network::LOCAL_NET_ID => {
            // Host-local networks are not usable by clients. Record the
            // interface index instead, so a follow-up resolve with this
            // info stays on the interface the service was seen on.
            info.network = None;
            info.interface_index = interface_index;
        }
        _ => {
            info.network = Some(NetworkHandle(net_id));
        }
    }
}

fn build_service_info_from_managed(event: &ManagedEvent) -> ServiceInfo {
    let mut info = ServiceInfo::new(&event.service.instance_name, &event.requested_service_type);
    let net_id = event
        .service
        .network
        .map(|network| network.0)
        .unwrap_or(network::NETID_UNSET);
    set_service_network_for_callback(&mut info, net_id, event.service.interface_index);
    info
}

#[cfg(test)]
impl NsdBroker {
    /// Synchronously drain and handle everything queued so far.
    fn pump(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            self.handle_message(message);
        }
    }
}
