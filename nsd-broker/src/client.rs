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

//! Per-client bookkeeping

use crate::labels;
use nsd_core::managed::ManagedListener;
use nsd_core::{ClientCallback, FailureCode, ListenerKey, ServiceInfo, TransactionId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Which legacy primitive started a request, so teardown can use the
/// matching stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LegacyOp {
    Discover,
    Register,
    Resolve,
    /// Resolve kept alive to feed a service-info watch.
    WatchResolve,
}

/// One outstanding client operation. The variant records which backend
/// started it; stop handling branches on the variant, never on the current
/// feature flags.
#[derive(Debug)]
pub(crate) enum ClientRequest {
    Legacy {
        global_id: TransactionId,
        op: LegacyOp,
    },
    ManagedDiscovery {
        global_id: TransactionId,
        listener: ManagedListener,
    },
    ManagedAdvertiser {
        global_id: TransactionId,
    },
}

impl ClientRequest {
    pub(crate) fn global_id(&self) -> TransactionId {
        match self {
            ClientRequest::Legacy { global_id, .. }
            | ClientRequest::ManagedDiscovery { global_id, .. }
            | ClientRequest::ManagedAdvertiser { global_id } => *global_id,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            ClientRequest::Legacy {
                op: LegacyOp::Discover,
                ..
            } => "Legacy(Discover)",
            ClientRequest::Legacy {
                op: LegacyOp::Register,
                ..
            } => "Legacy(Register)",
            ClientRequest::Legacy {
                op: LegacyOp::Resolve,
                ..
            } => "Legacy(Resolve)",
            ClientRequest::Legacy {
                op: LegacyOp::WatchResolve,
                ..
            } => "Legacy(WatchResolve)",
            ClientRequest::ManagedDiscovery { .. } => "ManagedDiscovery",
            ClientRequest::ManagedAdvertiser { .. } => "ManagedAdvertiser",
        }
    }
}

/// Information tracked per client.
///
/// Owned exclusively by the event loop. All callback deliveries go through
/// the wrapper methods below, which log and swallow sink errors so one dead
/// client cannot affect the others.
pub(crate) struct ClientRecord {
    callback: Arc<dyn ClientCallback>,

    /// Map from the client's listener key to its outstanding request.
    pub(crate) requests: HashMap<ListenerKey, ClientRequest>,

    /// True once the client has invoked the daemon-startup entrypoint.
    pub(crate) is_legacy_client: bool,

    /// Remembers a resolved service until the address lookup completes.
    pub(crate) resolved_service: Option<ServiceInfo>,

    /// The service whose updates this client watches.
    pub(crate) watched_service: Option<ServiceInfo>,

    /// The listener key the watch is attached to.
    pub(crate) watched_listener_key: Option<ListenerKey>,
}

impl ClientRecord {
    pub(crate) fn new(callback: Arc<dyn ClientCallback>) -> Self {
        log::debug!("New client");
        Self {
            callback,
            requests: HashMap::new(),
            is_legacy_client: false,
            resolved_service: None,
            watched_service: None,
            watched_listener_key: None,
        }
    }

    pub(crate) fn clear_watched_service(&mut self) {
        self.watched_service = None;
        self.watched_listener_key = None;
    }

    /// Reverse lookup: the listener key holding the request with this global
    /// id. Linear scan over at most the per-client cap.
    pub(crate) fn listener_key_for(&self, global_id: TransactionId) -> Option<ListenerKey> {
        self.requests
            .iter()
            .find(|(_, request)| request.global_id() == global_id)
            .map(|(key, _)| *key)
    }

    /// Notify the watcher if a lost service matches the one being watched.
    pub(crate) fn maybe_notify_watched_service_lost(&self, info: &ServiceInfo) {
        let Some(watched) = &self.watched_service else {
            return;
        };
        let Some(listener_key) = self.watched_listener_key else {
            return;
        };
        if watched.service_name != info.service_name {
            return;
        }
        if !labels::service_types_match(&watched.service_type, &info.service_type) {
            return;
        }
        self.service_updated_lost(listener_key);
    }

    pub(crate) fn discover_services_started(&self, listener_key: ListenerKey, info: &ServiceInfo) {
        if let Err(e) = self.callback.on_discover_services_started(listener_key, info) {
            log::error!("Error calling on_discover_services_started: {e}");
        }
    }

    pub(crate) fn discover_services_failed(&self, listener_key: ListenerKey, error: FailureCode) {
        if let Err(e) = self.callback.on_discover_services_failed(listener_key, error) {
            log::error!("Error calling on_discover_services_failed: {e}");
        }
    }

    pub(crate) fn service_found(&self, listener_key: ListenerKey, info: &ServiceInfo) {
        if let Err(e) = self.callback.on_service_found(listener_key, info) {
            log::error!("Error calling on_service_found: {e}");
        }
    }

    pub(crate) fn service_lost(&self, listener_key: ListenerKey, info: &ServiceInfo) {
        if let Err(e) = self.callback.on_service_lost(listener_key, info) {
            log::error!("Error calling on_service_lost: {e}");
        }
    }

    pub(crate) fn stop_discovery_succeeded(&self, listener_key: ListenerKey) {
        if let Err(e) = self.callback.on_stop_discovery_succeeded(listener_key) {
            log::error!("Error calling on_stop_discovery_succeeded: {e}");
        }
    }

    pub(crate) fn stop_discovery_failed(&self, listener_key: ListenerKey, error: FailureCode) {
        if let Err(e) = self.callback.on_stop_discovery_failed(listener_key, error) {
            log::error!("Error calling on_stop_discovery_failed: {e}");
        }
    }

    pub(crate) fn register_service_succeeded(&self, listener_key: ListenerKey, info: &ServiceInfo) {
        if let Err(e) = self.callback.on_register_service_succeeded(listener_key, info) {
            log::error!("Error calling on_register_service_succeeded: {e}");
        }
    }

    pub(crate) fn register_service_failed(&self, listener_key: ListenerKey, error: FailureCode) {
        if let Err(e) = self.callback.on_register_service_failed(listener_key, error) {
            log::error!("Error calling on_register_service_failed: {e}");
        }
    }

    pub(crate) fn unregister_service_succeeded(&self, listener_key: ListenerKey) {
        if let Err(e) = self.callback.on_unregister_service_succeeded(listener_key) {
            log::error!("Error calling on_unregister_service_succeeded: {e}");
        }
    }

    pub(crate) fn unregister_service_failed(&self, listener_key: ListenerKey, error: FailureCode) {
        if let Err(e) = self.callback.on_unregister_service_failed(listener_key, error) {
            log::error!("Error calling on_unregister_service_failed: {e}");
        }
    }

    pub(crate) fn resolve_service_succeeded(&self, listener_key: ListenerKey, info: &ServiceInfo) {
        if let Err(e) = self.callback.on_resolve_service_succeeded(listener_key, info) {
            log::error!("Error calling on_resolve_service_succeeded: {e}");
        }
    }

    pub(crate) fn resolve_service_failed(&self, listener_key: ListenerKey, error: FailureCode) {
        if let Err(e) = self.callback.on_resolve_service_failed(listener_key, error) {
            log::error!("Error calling on_resolve_service_failed: {e}");
        }
    }

    pub(crate) fn stop_resolution_succeeded(&self, listener_key: ListenerKey) {
        if let Err(e) = self.callback.on_stop_resolution_succeeded(listener_key) {
            log::error!("Error calling on_stop_resolution_succeeded: {e}");
        }
    }

    pub(crate) fn stop_resolution_failed(&self, listener_key: ListenerKey, error: FailureCode) {
        if let Err(e) = self.callback.on_stop_resolution_failed(listener_key, error) {
            log::error!("Error calling on_stop_resolution_failed: {e}");
        }
    }

    pub(crate) fn service_info_callback_registration_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) {
        if let Err(e) = self
            .callback
            .on_service_info_callback_registration_failed(listener_key, error)
        {
            log::error!("Error calling on_service_info_callback_registration_failed: {e}");
        }
    }

    pub(crate) fn service_updated(&self, listener_key: ListenerKey, info: &ServiceInfo) {
        if let Err(e) = self.callback.on_service_updated(listener_key, info) {
            log::error!("Error calling on_service_updated: {e}");
        }
    }

    pub(crate) fn service_updated_lost(&self, listener_key: ListenerKey) {
        if let Err(e) = self.callback.on_service_updated_lost(listener_key) {
            log::error!("Error calling on_service_updated_lost: {e}");
        }
    }

    pub(crate) fn service_info_callback_unregistered(&self, listener_key: ListenerKey) {
        if let Err(e) = self.callback.on_service_info_callback_unregistered(listener_key) {
            log::error!("Error calling on_service_info_callback_unregistered: {e}");
        }
    }
}

impl fmt::Display for ClientRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "resolved service: {:?}", self.resolved_service)?;
        writeln!(f, "legacy client: {}", self.is_legacy_client)?;
        for (listener_key, request) in &self.requests {
            writeln!(
                f,
                "listener key {listener_key} global id {} type {}",
                request.global_id(),
                request.kind_name()
            )?;
        }
        Ok(())
    }
}
