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

//! Mock legacy daemon

use nsd_core::legacy::{LegacyEngine, LegacyEvent, LegacyEventSink};
use nsd_core::TransactionId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One recorded call on the mock legacy daemon.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyCall {
    Discover {
        id: TransactionId,
        service_type: String,
        interface_index: u32,
    },
    RegisterService {
        id: TransactionId,
        service_name: String,
        service_type: String,
        port: u16,
        txt_attributes: HashMap<String, Vec<u8>>,
        interface_index: u32,
    },
    Resolve {
        id: TransactionId,
        service_name: String,
        service_type: String,
        domain: String,
        interface_index: u32,
    },
    GetServiceAddress {
        id: TransactionId,
        hostname: String,
        interface_index: u32,
    },
    StopOperation {
        id: TransactionId,
    },
}

#[derive(Default)]
struct State {
    started: bool,
    start_count: usize,
    stop_count: usize,
    sink: Option<Arc<dyn LegacyEventSink>>,
    calls: Vec<LegacyCall>,
    discover_result: Option<bool>,
    register_result: Option<bool>,
    resolve_result: Option<bool>,
    get_address_result: Option<bool>,
}

/// Mock implementation of [`LegacyEngine`].
///
/// Records every call; tests inject daemon events through [`deliver`]
/// (`MockLegacyEngine::deliver`). All control calls succeed unless a result
/// override is set.
#[derive(Clone, Default)]
pub struct MockLegacyEngine {
    state: Arc<Mutex<State>>,
}

impl MockLegacyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a daemon event into the registered sink.
    ///
    /// # Panics
    ///
    /// Panics if no event listener is registered (the daemon was never
    /// started).
    pub fn deliver(&self, event: LegacyEvent) {
        let sink = self
            .state
            .lock()
            .unwrap()
            .sink
            .clone()
            .expect("no event listener registered");
        sink.deliver(event);
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().unwrap().started
    }

    pub fn start_count(&self) -> usize {
        self.state.lock().unwrap().start_count
    }

    pub fn stop_count(&self) -> usize {
        self.state.lock().unwrap().stop_count
    }

    pub fn calls(&self) -> Vec<LegacyCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Ids of all `stop_operation` calls, in order.
    pub fn stopped_operations(&self) -> Vec<TransactionId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                LegacyCall::StopOperation { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn set_discover_result(&self, result: bool) {
        self.state.lock().unwrap().discover_result = Some(result);
    }

    pub fn set_register_result(&self, result: bool) {
        self.state.lock().unwrap().register_result = Some(result);
    }

    pub fn set_resolve_result(&self, result: bool) {
        self.state.lock().unwrap().resolve_result = Some(result);
    }

    pub fn set_get_address_result(&self, result: bool) {
        self.state.lock().unwrap().get_address_result = Some(result);
    }
}

impl LegacyEngine for MockLegacyEngine {
    fn register_event_listener(&mut self, sink: Arc<dyn LegacyEventSink>) {
        self.state.lock().unwrap().sink = Some(sink);
    }

    fn unregister_event_listener(&mut self) {
        self.state.lock().unwrap().sink = None;
    }

    fn start_daemon(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.started = true;
        state.start_count += 1;
    }

    fn stop_daemon(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.started = false;
        state.stop_count += 1;
    }

    fn discover(&mut self, id: TransactionId, service_type: &str, interface_index: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        state.calls.push(LegacyCall::Discover {
            id,
            service_type: service_type.to_string(),
            interface_index,
        });
        state.discover_result.unwrap_or(true)
    }

    fn register_service(
        &mut self,
        id: TransactionId,
        service_name: &str,
        service_type: &str,
        port: u16,
        txt_attributes: &HashMap<String, Vec<u8>>,
        interface_index: u32,
    ) -> bool {
        let mut state = self.state.lock().unwrap();
        state.calls.push(LegacyCall::RegisterService {
            id,
            service_name: service_name.to_string(),
            service_type: service_type.to_string(),
            port,
            txt_attributes: txt_attributes.clone(),
            interface_index,
        });
        state.register_result.unwrap_or(true)
    }

    fn resolve(
        &mut self,
        id: TransactionId,
        service_name: &str,
        service_type: &str,
        domain: &str,
        interface_index: u32,
    ) -> bool {
        let mut state = self.state.lock().unwrap();
        state.calls.push(LegacyCall::Resolve {
            id,
            service_name: service_name.to_string(),
            service_type: service_type.to_string(),
            domain: domain.to_string(),
            interface_index,
        });
        state.resolve_result.unwrap_or(true)
    }

    fn get_service_address(
        &mut self,
        id: TransactionId,
        hostname: &str,
        interface_index: u32,
    ) -> bool {
        let mut state = self.state.lock().unwrap();
        state.calls.push(LegacyCall::GetServiceAddress {
            id,
            hostname: hostname.to_string(),
            interface_index,
        });
        state.get_address_result.unwrap_or(true)
    }

    fn stop_operation(&mut self, id: TransactionId) -> bool {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(LegacyCall::StopOperation { id });
        true
    }
}
