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

//! Interface to the legacy out-of-process mDNS daemon

use crate::ids::TransactionId;
use std::collections::HashMap;
use std::sync::Arc;

/// Payload of discovery events (found / lost).
#[derive(Debug, Clone)]
pub struct DiscoveryPayload {
    pub service_name: String,
    /// Registration type as reported by the daemon, with a trailing dot,
    /// e.g. `_ipp._tcp.`.
    pub registration_type: String,
    pub net_id: u32,
    pub interface_index: u32,
}

/// Payload of registration events.
#[derive(Debug, Clone)]
pub struct RegistrationPayload {
    /// Name the service was actually registered under.
    pub service_name: String,
}

/// Payload of resolution events.
#[derive(Debug, Clone)]
pub struct ResolutionPayload {
    /// Full service name in DNS escape form, e.g.
    /// `Svc\032Name._ipp._tcp.local.`.
    pub service_full_name: String,
    pub hostname: String,
    pub port: u16,
    pub txt_attributes: HashMap<String, Vec<u8>>,
    pub interface_index: u32,
}

/// Payload of address lookup events.
#[derive(Debug, Clone)]
pub struct AddressPayload {
    /// Numeric address string, IPv4 or IPv6.
    pub address: String,
    pub net_id: u32,
    pub interface_index: u32,
}

/// Events reported by the legacy daemon, tagged with the transaction id of
/// the operation that produced them.
#[derive(Debug, Clone)]
pub enum LegacyEvent {
    ServiceFound {
        id: TransactionId,
        discovery: DiscoveryPayload,
    },
    ServiceLost {
        id: TransactionId,
        discovery: DiscoveryPayload,
    },
    DiscoveryFailed {
        id: TransactionId,
    },
    ServiceRegistered {
        id: TransactionId,
        registration: RegistrationPayload,
    },
    RegistrationFailed {
        id: TransactionId,
    },
    ServiceResolved {
        id: TransactionId,
        resolution: ResolutionPayload,
    },
    ResolutionFailed {
        id: TransactionId,
    },
    GetAddressSucceeded {
        id: TransactionId,
        address: AddressPayload,
    },
    GetAddressFailed {
        id: TransactionId,
    },
}

impl LegacyEvent {
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            LegacyEvent::ServiceFound { id, .. }
            | LegacyEvent::ServiceLost { id, .. }
            | LegacyEvent::DiscoveryFailed { id }
            | LegacyEvent::ServiceRegistered { id, .. }
            | LegacyEvent::RegistrationFailed { id }
            | LegacyEvent::ServiceResolved { id, .. }
            | LegacyEvent::ResolutionFailed { id }
            | LegacyEvent::GetAddressSucceeded { id, .. }
            | LegacyEvent::GetAddressFailed { id } => *id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LegacyEvent::ServiceFound { .. } => "ServiceFound",
            LegacyEvent::ServiceLost { .. } => "ServiceLost",
            LegacyEvent::DiscoveryFailed { .. } => "DiscoveryFailed",
            LegacyEvent::ServiceRegistered { .. } => "ServiceRegistered",
            LegacyEvent::RegistrationFailed { .. } => "RegistrationFailed",
            LegacyEvent::ServiceResolved { .. } => "ServiceResolved",
            LegacyEvent::ResolutionFailed { .. } => "ResolutionFailed",
            LegacyEvent::GetAddressSucceeded { .. } => "GetAddressSucceeded",
            LegacyEvent::GetAddressFailed { .. } => "GetAddressFailed",
        }
    }
}

/// Receives legacy daemon events.
///
/// The broker installs a sink that forwards every event into its message
/// queue; engine implementations must not assume the event is processed
/// before `deliver` returns.
pub trait LegacyEventSink: Send + Sync {
    fn deliver(&self, event: LegacyEvent);
}

/// Control surface of the legacy daemon.
///
/// All methods are called from the broker's event loop only. The boolean
/// returns mirror the daemon control protocol: `false` means the daemon
/// rejected the request synchronously, and no events will follow for that
/// transaction.
pub trait LegacyEngine: Send {
    fn register_event_listener(&mut self, sink: Arc<dyn LegacyEventSink>);

    fn unregister_event_listener(&mut self);

    fn start_daemon(&mut self);

    fn stop_daemon(&mut self);

    fn discover(&mut self, id: TransactionId, service_type: &str, interface_index: u32) -> bool;

    #[allow(clippy::too_many_arguments)]
    fn register_service(
        &mut self,
        id: TransactionId,
        service_name: &str,
        service_type: &str,
        port: u16,
        txt_attributes: &HashMap<String, Vec<u8>>,
        interface_index: u32,
    ) -> bool;

    fn resolve(
        &mut self,
        id: TransactionId,
        service_name: &str,
        service_type: &str,
        domain: &str,
        interface_index: u32,
    ) -> bool;

    fn get_service_address(
        &mut self,
        id: TransactionId,
        hostname: &str,
        interface_index: u32,
    ) -> bool;

    /// Cancel any outstanding operation with the given id.
    fn stop_operation(&mut self, id: TransactionId) -> bool;
}
