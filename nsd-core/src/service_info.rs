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

//! Service description value type

use crate::network::NetworkHandle;
use std::collections::HashMap;
use std::net::IpAddr;

/// Maximum length in bytes of a DNS label (RFC 1034/1035).
pub const MAX_LABEL_LENGTH: usize = 63;

// One TXT key/value pair must fit a single character-string (RFC 6763 6.1).
const MAX_TXT_PAIR_LENGTH: usize = 255;

/// Describes a service to discover, register or resolve, and carries the
/// results reported back to clients.
///
/// A `ServiceInfo` is a plain value: which fields are meaningful depends on
/// the operation. A discovery request only needs `service_type`; a resolve
/// result additionally carries port, TXT attributes, the network the service
/// was found on and its host addresses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceInfo {
    /// Service instance name, UTF-8, at most [`MAX_LABEL_LENGTH`] bytes when
    /// registering.
    pub service_name: String,

    /// Service type, e.g. `_http._tcp`, optionally with a leading subtype
    /// label.
    pub service_type: String,

    /// Port the service listens on; `None` when not applicable.
    pub port: Option<u16>,

    /// TXT attributes. Insertion order is irrelevant.
    pub txt_attributes: HashMap<String, Vec<u8>>,

    /// Network the operation is scoped to, or the service was found on.
    pub network: Option<NetworkHandle>,

    /// OS interface index the service was seen on; 0 when unknown.
    pub interface_index: u32,

    /// Host addresses of the resolved service.
    pub host_addresses: Vec<IpAddr>,
}

impl ServiceInfo {
    pub fn new(service_name: &str, service_type: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            service_type: service_type.to_string(),
            ..Default::default()
        }
    }

    /// Add a TXT attribute, validating the key and the pair length.
    ///
    /// Keys must be printable ASCII without `=`; a key/value pair must fit
    /// in 255 bytes.
    pub fn set_attribute(&mut self, key: &str, value: Vec<u8>) -> Result<(), AttributeError> {
        if key.is_empty() {
            return Err(AttributeError::EmptyKey);
        }
        if !key.bytes().all(|b| (0x20..=0x7e).contains(&b) && b != b'=') {
            return Err(AttributeError::InvalidKey(key.to_string()));
        }
        if key.len() + value.len() > MAX_TXT_PAIR_LENGTH {
            return Err(AttributeError::PairTooLong(key.to_string()));
        }
        self.txt_attributes.insert(key.to_string(), value);
        Ok(())
    }
}

/// A TXT attribute was rejected.
#[derive(Debug, thiserror::Error)]
pub enum AttributeError {
    #[error("TXT attribute key is empty")]
    EmptyKey,

    #[error("TXT attribute key is not printable ASCII without '=': {0:?}")]
    InvalidKey(String),

    #[error("TXT attribute pair for key {0:?} exceeds 255 bytes")]
    PairTooLong(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_attribute() {
        let mut info = ServiceInfo::new("printer", "_ipp._tcp");
        info.set_attribute("rp", b"ipp/print".to_vec()).unwrap();
        assert_eq!(
            info.txt_attributes.get("rp").map(Vec::as_slice),
            Some(b"ipp/print".as_slice())
        );
    }

    #[test]
    fn test_set_attribute_rejects_bad_keys() {
        let mut info = ServiceInfo::new("printer", "_ipp._tcp");
        assert!(matches!(
            info.set_attribute("", b"x".to_vec()),
            Err(AttributeError::EmptyKey)
        ));
        assert!(matches!(
            info.set_attribute("a=b", b"x".to_vec()),
            Err(AttributeError::InvalidKey(_))
        ));
        assert!(matches!(
            info.set_attribute("k\u{e9}y", b"x".to_vec()),
            Err(AttributeError::InvalidKey(_))
        ));
        assert!(info.txt_attributes.is_empty());
    }

    #[test]
    fn test_set_attribute_rejects_oversized_pair() {
        let mut info = ServiceInfo::new("printer", "_ipp._tcp");
        assert!(matches!(
            info.set_attribute("key", vec![0u8; 253]),
            Err(AttributeError::PairTooLong(_))
        ));
        // 3 + 252 = 255 is exactly at the limit.
        info.set_attribute("key", vec![0u8; 252]).unwrap();
    }
}
