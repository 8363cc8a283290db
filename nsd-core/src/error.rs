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

//! Failure taxonomy surfaced to clients

/// Error codes delivered to clients through their callback sink.
///
/// Engine-side errors never crash the broker; each one is converted to one
/// of these codes for the originating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FailureCode {
    /// Unspecified broker or engine failure.
    #[error("internal error")]
    InternalError,

    /// The per-client outstanding-request limit was reached.
    #[error("request limit reached")]
    MaxLimit,

    /// An equivalent operation is already active for this client.
    #[error("operation already active")]
    AlreadyActive,

    /// The request arguments were rejected.
    #[error("bad parameters")]
    BadParameters,

    /// A stop was issued for an operation that is not running.
    #[error("operation not running")]
    OperationNotRunning,
}

/// Delivery of a callback to a client sink failed, e.g. the peer is gone.
///
/// The broker logs and swallows these: one client's dead sink must not
/// affect other clients.
#[derive(Debug, thiserror::Error)]
#[error("failed to deliver callback: {reason}")]
pub struct CallbackError {
    reason: String,
}

impl CallbackError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
