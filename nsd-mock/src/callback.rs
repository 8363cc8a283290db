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

//! Recording client callback sink

use nsd_core::{CallbackError, ClientCallback, FailureCode, ListenerKey, ServiceInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// One recorded delivery to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEvent {
    DiscoverStarted(ListenerKey, ServiceInfo),
    DiscoverFailed(ListenerKey, FailureCode),
    ServiceFound(ListenerKey, ServiceInfo),
    ServiceLost(ListenerKey, ServiceInfo),
    StopDiscoverySucceeded(ListenerKey),
    StopDiscoveryFailed(ListenerKey, FailureCode),
    RegisterSucceeded(ListenerKey, ServiceInfo),
    RegisterFailed(ListenerKey, FailureCode),
    UnregisterSucceeded(ListenerKey),
    UnregisterFailed(ListenerKey, FailureCode),
    ResolveSucceeded(ListenerKey, ServiceInfo),
    ResolveFailed(ListenerKey, FailureCode),
    StopResolutionSucceeded(ListenerKey),
    StopResolutionFailed(ListenerKey, FailureCode),
    CallbackRegistrationFailed(ListenerKey, FailureCode),
    ServiceUpdated(ListenerKey, ServiceInfo),
    ServiceUpdatedLost(ListenerKey),
    CallbackUnregistered(ListenerKey),
}

/// [`ClientCallback`] implementation that records every delivery.
///
/// With `set_dead(true)` every delivery fails, simulating a client whose
/// IPC peer is gone; the attempt is still recorded.
#[derive(Clone, Default)]
pub struct RecordingCallback {
    events: Arc<Mutex<Vec<CallbackEvent>>>,
    dead: Arc<AtomicBool>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Drain and return all recorded deliveries.
    pub fn take_events(&self) -> Vec<CallbackEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn set_dead(&self, dead: bool) {
        self.dead.store(dead, Ordering::SeqCst);
    }

    fn record(&self, event: CallbackEvent) -> Result<(), CallbackError> {
        self.events.lock().unwrap().push(event);
        if self.dead.load(Ordering::SeqCst) {
            Err(CallbackError::new("peer is gone"))
        } else {
            Ok(())
        }
    }
}

impl ClientCallback for RecordingCallback {
    fn on_discover_services_started(
        &self,
        listener_key: ListenerKey,
        info: &ServiceInfo,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::DiscoverStarted(listener_key, info.clone()))
    }

    fn on_discover_services_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::DiscoverFailed(listener_key, error))
    }

    fn on_service_found(
        &self,
        listener_key: ListenerKey,
        info: &ServiceInfo,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::ServiceFound(listener_key, info.clone()))
    }

    fn on_service_lost(
        &self,
        listener_key: ListenerKey,
        info: &ServiceInfo,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::ServiceLost(listener_key, info.clone()))
    }

    fn on_stop_discovery_succeeded(&self, listener_key: ListenerKey) -> Result<(), CallbackError> {
        self.record(CallbackEvent::StopDiscoverySucceeded(listener_key))
    }

    fn on_stop_discovery_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::StopDiscoveryFailed(listener_key, error))
    }

    fn on_register_service_succeeded(
        &self,
        listener_key: ListenerKey,
        info: &ServiceInfo,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::RegisterSucceeded(listener_key, info.clone()))
    }

    fn on_register_service_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::RegisterFailed(listener_key, error))
    }

    fn on_unregister_service_succeeded(
        &self,
        listener_key: ListenerKey,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::UnregisterSucceeded(listener_key))
    }

    fn on_unregister_service_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::UnregisterFailed(listener_key, error))
    }

    fn on_resolve_service_succeeded(
        &self,
        listener_key: ListenerKey,
        info: &ServiceInfo,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::ResolveSucceeded(listener_key, info.clone()))
    }

    fn on_resolve_service_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::ResolveFailed(listener_key, error))
    }

    fn on_stop_resolution_succeeded(
        &self,
        listener_key: ListenerKey,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::StopResolutionSucceeded(listener_key))
    }

    fn on_stop_resolution_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::StopResolutionFailed(listener_key, error))
    }

    fn on_service_info_callback_registration_failed(
        &self,
        listener_key: ListenerKey,
        error: FailureCode,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::CallbackRegistrationFailed(
            listener_key,
            error,
        ))
    }

    fn on_service_updated(
        &self,
        listener_key: ListenerKey,
        info: &ServiceInfo,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::ServiceUpdated(listener_key, info.clone()))
    }

    fn on_service_updated_lost(&self, listener_key: ListenerKey) -> Result<(), CallbackError> {
        self.record(CallbackEvent::ServiceUpdatedLost(listener_key))
    }

    fn on_service_info_callback_unregistered(
        &self,
        listener_key: ListenerKey,
    ) -> Result<(), CallbackError> {
        self.record(CallbackEvent::CallbackUnregistered(listener_key))
    }
}
