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

//! Small test doubles: feature flags, interface resolver, state broadcaster

use nsd_core::flags::{FeatureFlags, StateBroadcaster};
use nsd_core::network::{InterfaceResolver, NetworkHandle, IFACE_IDX_ANY};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Feature flags togglable at any point during a test.
#[derive(Clone, Default)]
pub struct MockFeatureFlags {
    discovery_manager: Arc<AtomicBool>,
    advertiser: Arc<AtomicBool>,
}

impl MockFeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_discovery_manager_enabled(&self, enabled: bool) {
        self.discovery_manager.store(enabled, Ordering::SeqCst);
    }

    pub fn set_advertiser_enabled(&self, enabled: bool) {
        self.advertiser.store(enabled, Ordering::SeqCst);
    }
}

impl FeatureFlags for MockFeatureFlags {
    fn discovery_manager_enabled(&self) -> bool {
        self.discovery_manager.load(Ordering::SeqCst)
    }

    fn advertiser_enabled(&self) -> bool {
        self.advertiser.load(Ordering::SeqCst)
    }
}

/// Interface resolver backed by a plain map; unknown networks resolve to
/// [`IFACE_IDX_ANY`].
#[derive(Clone, Default)]
pub struct MockInterfaceResolver {
    interfaces: Arc<Mutex<HashMap<NetworkHandle, u32>>>,
}

impl MockInterfaceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, network: NetworkHandle, interface_index: u32) {
        self.interfaces
            .lock()
            .unwrap()
            .insert(network, interface_index);
    }
}

impl InterfaceResolver for MockInterfaceResolver {
    fn interface_index_for(&self, network: NetworkHandle) -> u32 {
        self.interfaces
            .lock()
            .unwrap()
            .get(&network)
            .copied()
            .unwrap_or(IFACE_IDX_ANY)
    }
}

/// Records enablement broadcasts.
#[derive(Clone, Default)]
pub struct RecordingBroadcaster {
    broadcasts: Arc<Mutex<Vec<bool>>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcasts(&self) -> Vec<bool> {
        self.broadcasts.lock().unwrap().clone()
    }
}

impl StateBroadcaster for RecordingBroadcaster {
    fn on_nsd_state_changed(&self, enabled: bool) {
        self.broadcasts.lock().unwrap().push(enabled);
    }
}
