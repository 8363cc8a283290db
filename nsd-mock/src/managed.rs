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

//! Mock managed engine: discovery manager, advertiser, socket provider

use nsd_core::managed::{
    Advertiser, AdvertiserEvent, AdvertiserEventSink, DiscoveryManager, ManagedListener,
    SearchOptions, SocketProvider,
};
use nsd_core::{FailureCode, ServiceInfo, TransactionId};
use std::sync::{Arc, Mutex};

/// One listener registration recorded by the mock discovery manager.
#[derive(Debug, Clone)]
pub struct Registration {
    pub service_type: String,
    pub listener: ManagedListener,
    pub options: SearchOptions,
}

#[derive(Default)]
struct ManagerState {
    registered: Vec<Registration>,
    unregistered: Vec<(String, TransactionId)>,
}

/// Mock implementation of [`DiscoveryManager`].
#[derive(Clone, Default)]
pub struct MockDiscoveryManager {
    state: Arc<Mutex<ManagerState>>,
}

impl MockDiscoveryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.state.lock().unwrap().registered.clone()
    }

    /// The most recently registered listener, for injecting events.
    pub fn last_listener(&self) -> Option<ManagedListener> {
        self.state
            .lock()
            .unwrap()
            .registered
            .last()
            .map(|r| r.listener.clone())
    }

    /// `(service_type, transaction_id)` of every unregistration, in order.
    pub fn unregistrations(&self) -> Vec<(String, TransactionId)> {
        self.state.lock().unwrap().unregistered.clone()
    }
}

impl DiscoveryManager for MockDiscoveryManager {
    fn register_listener(
        &mut self,
        service_type: &str,
        listener: &ManagedListener,
        options: SearchOptions,
    ) {
        self.state.lock().unwrap().registered.push(Registration {
            service_type: service_type.to_string(),
            listener: listener.clone(),
            options,
        });
    }

    fn unregister_listener(&mut self, service_type: &str, listener: &ManagedListener) {
        self.state
            .lock()
            .unwrap()
            .unregistered
            .push((service_type.to_string(), listener.transaction_id()));
    }
}

#[derive(Default)]
struct AdvertiserState {
    sink: Option<Arc<dyn AdvertiserEventSink>>,
    added: Vec<(TransactionId, ServiceInfo)>,
    removed: Vec<TransactionId>,
}

/// Mock implementation of [`Advertiser`].
///
/// Registration results are injected by the test through [`succeed`]
/// (`MockAdvertiser::succeed`) and [`fail`] (`MockAdvertiser::fail`).
#[derive(Clone, Default)]
pub struct MockAdvertiser {
    state: Arc<Mutex<AdvertiserState>>,
}

impl MockAdvertiser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn added(&self) -> Vec<(TransactionId, ServiceInfo)> {
        self.state.lock().unwrap().added.clone()
    }

    pub fn removed(&self) -> Vec<TransactionId> {
        self.state.lock().unwrap().removed.clone()
    }

    /// Report a successful registration for `id`.
    pub fn succeed(&self, id: TransactionId, info: ServiceInfo) {
        self.sink()
            .deliver(AdvertiserEvent::RegisterSucceeded { id, info });
    }

    /// Report a failed registration for `id`.
    pub fn fail(&self, id: TransactionId, error: FailureCode) {
        self.sink()
            .deliver(AdvertiserEvent::RegisterFailed { id, error });
    }

    fn sink(&self) -> Arc<dyn AdvertiserEventSink> {
        self.state
            .lock()
            .unwrap()
            .sink
            .clone()
            .expect("no advertiser callback registered")
    }
}

impl Advertiser for MockAdvertiser {
    fn register_callback(&mut self, sink: Arc<dyn AdvertiserEventSink>) {
        self.state.lock().unwrap().sink = Some(sink);
    }

    fn add_service(&mut self, id: TransactionId, info: ServiceInfo) {
        self.state.lock().unwrap().added.push((id, info));
    }

    fn remove_service(&mut self, id: TransactionId) {
        self.state.lock().unwrap().removed.push(id);
    }
}

#[derive(Default)]
struct SocketState {
    monitoring: bool,
    start_count: usize,
    stop_count: usize,
}

/// Mock implementation of [`SocketProvider`].
#[derive(Clone, Default)]
pub struct MockSocketProvider {
    state: Arc<Mutex<SocketState>>,
}

impl MockSocketProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_monitoring(&self) -> bool {
        self.state.lock().unwrap().monitoring
    }

    pub fn start_count(&self) -> usize {
        self.state.lock().unwrap().start_count
    }

    pub fn stop_count(&self) -> usize {
        self.state.lock().unwrap().stop_count
    }
}

impl SocketProvider for MockSocketProvider {
    fn start_monitoring_sockets(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.monitoring = true;
        state.start_count += 1;
    }

    fn stop_monitoring_sockets(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.monitoring = false;
        state.stop_count += 1;
    }
}
