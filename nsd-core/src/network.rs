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

//! Network identifiers and the interface lookup seam

use std::fmt;

/// Raw net id reported for services without an associated network.
pub const NETID_UNSET: u32 = 0;

/// Raw net id of the host-local network. Services on it are not generally
/// usable by clients, so it is never surfaced as a [`NetworkHandle`].
pub const LOCAL_NET_ID: u32 = 99;

/// Raw net id of the dummy interface. Services seen there are only locally
/// advertised ones and are not reachable through that interface.
pub const DUMMY_NET_ID: u32 = 51;

/// Interface index wildcard accepted by the legacy daemon.
pub const IFACE_IDX_ANY: u32 = 0;

/// Opaque handle to a host network, as exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkHandle(pub u32);

impl fmt::Display for NetworkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves a network handle to the OS interface index to use for it.
///
/// The lookup is best-effort: a network that is gone, or not yet fully set
/// up, resolves to [`IFACE_IDX_ANY`] and the caller fails the request.
pub trait InterfaceResolver: Send {
    fn interface_index_for(&self, network: NetworkHandle) -> u32;
}
