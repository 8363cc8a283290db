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

//! Network service discovery broker
//!
//! A long-lived, process-wide service that multiplexes many concurrent
//! clients onto the host's mDNS/DNS-SD machinery. Clients never speak mDNS
//! themselves: they issue typed requests (discover, register, resolve,
//! watch) through a [`Connector`], and the broker forwards them to one of
//! two underlying engines while tracking per-client state and delivering
//! asynchronous callbacks.
//!
//! ## Architecture
//!
//! - **Single-threaded event loop**: [`NsdBroker::run`] is the sole writer
//!   of all broker state. Every external input — client call, engine
//!   callback, peer death, cleanup tick — enters as a typed message on one
//!   queue, and each message is handled to completion before the next.
//! - **Two-level identifier namespace**: clients label their operations with
//!   their own listener keys; the broker allocates a process-unique
//!   transaction id per operation and keeps a bijection between the two, so
//!   engine callbacks resolve to the owning client in O(1).
//! - **Backend routing**: each start operation consults the feature flags to
//!   pick the legacy daemon or the managed engine; the chosen backend is
//!   stamped onto the stored request so a later stop always goes to the
//!   backend that started it.
//! - **Lazy engine lifecycle**: the legacy daemon is started on first need
//!   and stopped a configurable delay after the last legacy request is gone;
//!   socket monitoring for the managed engine follows the set of live
//!   managed requests.
//!
//! Engines and IPC transports are collaborators behind the traits in
//! `nsd-core`; `nsd-mock` provides in-memory stand-ins for tests.
//!
//! # Example
//!
//! ```no_run
//! use nsd_broker::{BrokerConfig, Dependencies, NsdBroker};
//! use nsd_mock::{
//!     MockAdvertiser, MockDiscoveryManager, MockFeatureFlags, MockInterfaceResolver,
//!     MockLegacyEngine, MockSocketProvider, RecordingBroadcaster,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let deps = Dependencies {
//!     legacy_engine: Box::new(MockLegacyEngine::new()),
//!     discovery_manager: Box::new(MockDiscoveryManager::new()),
//!     advertiser: Box::new(MockAdvertiser::new()),
//!     socket_provider: Box::new(MockSocketProvider::new()),
//!     interface_resolver: Box::new(MockInterfaceResolver::new()),
//!     flags: Box::new(MockFeatureFlags::new()),
//!     broadcaster: Box::new(RecordingBroadcaster::new()),
//! };
//! let handle = NsdBroker::spawn(deps, BrokerConfig::default());
//! // Hand `handle` to the IPC layer; each client gets a Connector from
//! // `handle.connect(callback)`.
//! # }
//! ```

pub mod broker;
pub mod client;
pub mod config;
pub mod connector;
pub mod labels;
pub mod messages;

pub use broker::{Dependencies, NsdBroker};
pub use config::BrokerConfig;
pub use connector::{BrokerHandle, Connector, ConnectorId};
