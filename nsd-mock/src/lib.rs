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

//! In-memory mock engines for broker tests
//!
//! Every mock is a cheap handle over shared state: tests keep one clone to
//! inspect recorded calls and inject engine events, and hand another clone
//! to the broker. No networking is involved.

pub mod callback;
pub mod engine;
pub mod managed;
pub mod support;

pub use callback::{CallbackEvent, RecordingCallback};
pub use engine::{LegacyCall, MockLegacyEngine};
pub use managed::{MockAdvertiser, MockDiscoveryManager, MockSocketProvider, Registration};
pub use support::{MockFeatureFlags, MockInterfaceResolver, RecordingBroadcaster};
