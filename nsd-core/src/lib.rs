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

//! Core types and collaborator interfaces for the NSD broker
//!
//! This crate defines the data model shared between the broker and the mDNS
//! engines it drives, without being tied to a specific engine implementation.
//!
//! ## Architecture
//!
//! - **Value types**: [`ServiceInfo`], [`NetworkHandle`], the identifier
//!   newtypes [`TransactionId`] and [`ListenerKey`], and the client-visible
//!   failure taxonomy [`FailureCode`].
//! - **Backend seams**: [`LegacyEngine`] (the out-of-process daemon),
//!   [`DiscoveryManager`], [`Advertiser`] and [`SocketProvider`] (the managed
//!   in-process engine), and [`InterfaceResolver`] for network-to-interface
//!   lookup.
//! - **Callback seams**: [`ClientCallback`] for deliveries to clients, and
//!   the per-engine event sinks that forward engine callbacks into the
//!   broker's message queue.
//!
//! Production engines live outside this repository; `nsd-mock` provides
//! in-memory doubles for tests.

pub mod callback;
pub mod error;
pub mod flags;
pub mod ids;
pub mod legacy;
pub mod managed;
pub mod network;
pub mod service_info;

pub use callback::ClientCallback;
pub use error::{CallbackError, FailureCode};
pub use flags::{FeatureFlags, StateBroadcaster};
pub use ids::{ListenerKey, TransactionId};
pub use legacy::{LegacyEngine, LegacyEvent, LegacyEventSink};
pub use managed::{
    Advertiser, AdvertiserEvent, AdvertiserEventSink, DiscoveryManager, ListenerKind,
    ManagedEvent, ManagedEventKind, ManagedListener, ManagedServiceInfo, SearchOptions,
    SocketProvider,
};
pub use network::{InterfaceResolver, NetworkHandle, IFACE_IDX_ANY};
pub use service_info::{AttributeError, ServiceInfo, MAX_LABEL_LENGTH};
