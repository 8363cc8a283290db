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

//! Feature flags and enablement broadcast seams

/// Read-only backend selection flags, consulted once per start operation.
///
/// A stop or unregister never re-reads these: it routes on the backend the
/// stored request was started with, so a flag flip mid-flight cannot orphan
/// a request against the wrong backend.
pub trait FeatureFlags: Send {
    /// Route discovery and resolution through the managed discovery manager
    /// instead of the legacy daemon.
    fn discovery_manager_enabled(&self) -> bool;

    /// Route registration through the managed advertiser instead of the
    /// legacy daemon.
    fn advertiser_enabled(&self) -> bool;
}

/// Receives broadcasts of the broker's enablement state.
pub trait StateBroadcaster: Send {
    fn on_nsd_state_changed(&self, enabled: bool);
}
