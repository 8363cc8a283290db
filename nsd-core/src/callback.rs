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

//! Per-client callback sink

use crate::error::{CallbackError, FailureCode};
use crate::ids::ListenerKey;
use crate::service_info::ServiceInfo;

/// Deliveries from the broker to one client, keyed by the client's own
/// listener key.
///
/// Implementations typically marshal the call across an IPC boundary. A
/// returned [`CallbackError`] means the peer could not be reached; the broker
/// logs it and carries on.
pub trait ClientCallback: Send + Sync {
    fn on_discover_services_started(
        &self,
        listener_key: ListenerKey,
        info: &ServiceInfo,
    ) -> Result<(), CallbackError>;

    fn on_discover_services_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) -> Result<(), CallbackError>;

    /// A service matching an active discovery appeared on the network.
    fn on_service_found(
        &self,
        listener_key: ListenerKey,
        info: &ServiceInfo,
    ) -> Result<(), CallbackError>;

    /// A previously reported service disappeared.
    fn on_service_lost(
        &self,
        listener_key: ListenerKey,
        info: &ServiceInfo,
    ) -> Result<(), CallbackError>;

    fn on_stop_discovery_succeeded(&self, listener_key: ListenerKey) -> Result<(), CallbackError>;

    fn on_stop_discovery_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) -> Result<(), CallbackError>;

    /// Registration succeeded. `info` carries only the service name actually
    /// registered, which may differ from the requested one after a conflict
    /// rename.
    fn on_register_service_succeeded(
        &self,
        listener_key: ListenerKey,
        info: &ServiceInfo,
    ) -> Result<(), CallbackError>;

    fn on_register_service_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) -> Result<(), CallbackError>;

    fn on_unregister_service_succeeded(
        &self,
        listener_key: ListenerKey,
    ) -> Result<(), CallbackError>;

    fn on_unregister_service_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) -> Result<(), CallbackError>;

    fn on_resolve_service_succeeded(
        &self,
        listener_key: ListenerKey,
        info: &ServiceInfo,
    ) -> Result<(), CallbackError>;

    fn on_resolve_service_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) -> Result<(), CallbackError>;

    fn on_stop_resolution_succeeded(&self, listener_key: ListenerKey)
        -> Result<(), CallbackError>;

    fn on_stop_resolution_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) -> Result<(), CallbackError>;

    fn on_service_info_callback_registration_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) -> Result<(), CallbackError>;

    /// The watched service was re-resolved; `info` is the updated snapshot.
    fn on_service_updated(
        &self,
        listener_key: ListenerKey,
        info: &ServiceInfo,
    ) -> Result<(), CallbackError>;

    /// The watched service disappeared from the network.
    fn on_service_updated_lost(&self, listener_key: ListenerKey) -> Result<(), CallbackError>;

    fn on_service_info_callback_unregistered(
        &self,
        listener_key: ListenerKey,
    ) -> Result<(), CallbackError>;
}
