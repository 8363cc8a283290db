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

//! Broker configuration

use std::time::Duration;

const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_millis(10_000);
const DEFAULT_MAX_REQUESTS_PER_CLIENT: usize = 10;

/// Construction-time broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// How long the legacy daemon is kept alive after the last legacy
    /// request is gone.
    pub cleanup_delay: Duration,

    /// Cap on outstanding requests per client.
    pub max_requests_per_client: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            cleanup_delay: DEFAULT_CLEANUP_DELAY,
            max_requests_per_client: DEFAULT_MAX_REQUESTS_PER_CLIENT,
        }
    }
}
