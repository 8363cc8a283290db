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

//! Name-label utilities: service-type validation, name truncation, DNS
//! unescaping

use nsd_core::MAX_LABEL_LENGTH;
use regex::Regex;
use std::sync::OnceLock;

fn service_type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            "^(_[a-zA-Z0-9_-]{1,61}[a-zA-Z0-9]\\.)?\
             (_[a-zA-Z0-9_-]{1,61}[a-zA-Z0-9]\\._(?:tcp|udp))$",
        )
        .expect("service type pattern is valid")
    })
}

/// Check a service type and construct the form usable for discovery and
/// resolution.
///
/// A valid service type is 2 labels, or 3 labels if the query is for a
/// subtype (RFC 6763 7.1). Each label is up to 63 characters and must start
/// with an underscore; the characters are alphanumerical, dashes or
/// underscores, except the last one which is just alphanumerical. The last
/// label must be `_tcp` or `_udp`.
///
/// Returns the constructed service type, with a subtype rewritten to the
/// canonical `<subtype>._sub.<type>` form, or `None` if the input is
/// invalid.
pub(crate) fn construct_service_type(service_type: &str) -> Option<String> {
    if service_type.is_empty() {
        return None;
    }
    let captures = service_type_pattern().captures(service_type)?;
    match captures.get(1) {
        None => Some(service_type.to_string()),
        Some(subtype) => Some(format!("{}_sub.{}", subtype.as_str(), &captures[2])),
    }
}

/// Truncate a service name to at most [`MAX_LABEL_LENGTH`] UTF-8 bytes.
///
/// Service instance names are UTF-8 and up to 63 bytes (RFC 6763 4.1.1).
/// Truncating names used in registration follows the historical daemon
/// behavior. Never splits a codepoint.
pub(crate) fn truncate_service_name(original: &str) -> String {
    // UTF-8 is at most 4 bytes per codepoint, so a name this short cannot
    // possibly be over the limit.
    if original.chars().count() <= MAX_LABEL_LENGTH / 4 {
        return original.to_string();
    }

    let mut end = 0;
    for (index, ch) in original.char_indices() {
        if index + ch.len_utf8() > MAX_LABEL_LENGTH {
            break;
        }
        end = index + ch.len_utf8();
    }
    original[..end].to_string()
}

/// Undo DNS name escaping as produced by the legacy daemon.
///
/// A backslash followed by `.` or `\` is that literal character; a backslash
/// followed by three decimal digits is a decimal-encoded byte. Truncated
/// escape sequences are logged and terminate parsing.
pub(crate) fn unescape(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < chars.len() {
        let mut c = chars[i];
        if c == '\\' {
            i += 1;
            if i >= chars.len() {
                log::error!("Unexpected end of escape sequence in: {s}");
                break;
            }
            c = chars[i];
            if c != '.' && c != '\\' {
                if i + 2 >= chars.len() {
                    log::error!("Unexpected end of escape sequence in: {s}");
                    break;
                }
                let code = (chars[i] as u32)
                    .wrapping_sub('0' as u32)
                    .wrapping_mul(100)
                    .wrapping_add((chars[i + 1] as u32).wrapping_sub('0' as u32).wrapping_mul(10))
                    .wrapping_add((chars[i + 2] as u32).wrapping_sub('0' as u32));
                match char::from_u32(code) {
                    Some(decoded) => c = decoded,
                    None => {
                        log::error!("Invalid escape sequence in: {s}");
                        break;
                    }
                }
                i += 2;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Split a full service name reported by the legacy daemon into the
/// unescaped instance name and the bare service type.
///
/// The instance portion is everything up to the first unescaped `.`; the
/// remainder has the `.local.` suffix stripped and the leading dot removed.
/// Returns `None` when no unescaped dot exists.
pub(crate) fn split_resolved_full_name(full_name: &str) -> Option<(String, String)> {
    let chars: Vec<char> = full_name.chars().collect();
    let mut index = 0;
    while index < chars.len() && chars[index] != '.' {
        if chars[index] == '\\' {
            index += 1;
        }
        index += 1;
    }
    if index >= chars.len() {
        return None;
    }

    let name = unescape(&chars[..index].iter().collect::<String>());
    let rest: String = chars[index..].iter().collect();
    let service_type = rest.replace(".local.", "");
    let service_type = service_type
        .strip_prefix('.')
        .unwrap_or(&service_type)
        .to_string();
    Some((name, service_type))
}

/// Compare two service types ignoring the leading/trailing dot conventions.
///
/// Resolved infos carry a leading dot on their type while discovered infos
/// carry a trailing one; watch-mode loss matching must tolerate both.
pub(crate) fn service_types_match(a: &str, b: &str) -> bool {
    a.trim_matches('.') == b.trim_matches('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construct_service_type_plain() {
        assert_eq!(
            construct_service_type("_foo._tcp").as_deref(),
            Some("_foo._tcp")
        );
        assert_eq!(
            construct_service_type("_http._udp").as_deref(),
            Some("_http._udp")
        );
    }

    #[test]
    fn test_construct_service_type_subtype_is_canonicalized() {
        assert_eq!(
            construct_service_type("_bar._foo._tcp").as_deref(),
            Some("_bar._sub._foo._tcp")
        );
    }

    #[test]
    fn test_construct_service_type_rejects_invalid() {
        assert_eq!(construct_service_type(""), None);
        assert_eq!(construct_service_type("_foo._sctp"), None);
        assert_eq!(construct_service_type("foo._tcp"), None);
        assert_eq!(construct_service_type("_foo_tcp"), None);
        // Label may not end in '-' or '_'.
        assert_eq!(construct_service_type("_foo-._tcp"), None);
    }

    #[test]
    fn test_truncate_short_name_unchanged() {
        assert_eq!(truncate_service_name("printer"), "printer");
    }

    #[test]
    fn test_truncate_ascii_to_63_bytes() {
        let name = "a".repeat(100);
        let truncated = truncate_service_name(&name);
        assert_eq!(truncated.len(), 63);
        assert_eq!(truncated, "a".repeat(63));
    }

    #[test]
    fn test_truncate_on_codepoint_boundary() {
        // 20 four-byte codepoints; 63 / 4 = 15 fit whole.
        let name: String = std::iter::repeat('\u{1F602}').take(20).collect();
        let truncated = truncate_service_name(&name);
        assert!(truncated.len() <= 63);
        assert_eq!(truncated.chars().count(), 15);
        assert_eq!(truncated.len(), 60);
    }

    #[test]
    fn test_truncate_exactly_at_limit() {
        let name = "b".repeat(63);
        assert_eq!(truncate_service_name(&name), name);
    }

    #[test]
    fn test_unescape_literals() {
        assert_eq!(unescape(r"a\.b"), "a.b");
        assert_eq!(unescape(r"a\\b"), r"a\b");
    }

    #[test]
    fn test_unescape_decimal() {
        assert_eq!(unescape(r"Svc\032Name"), "Svc Name");
    }

    #[test]
    fn test_unescape_truncated_sequence_stops() {
        assert_eq!(unescape(r"abc\"), "abc");
        assert_eq!(unescape(r"abc\03"), "abc");
    }

    #[test]
    fn test_split_resolved_full_name() {
        let (name, service_type) =
            split_resolved_full_name(r"Svc\032Name._foo._tcp.local.").unwrap();
        assert_eq!(name, "Svc Name");
        assert_eq!(service_type, "_foo._tcp");
    }

    #[test]
    fn test_split_resolved_full_name_escaped_dot() {
        let (name, service_type) = split_resolved_full_name(r"a\.b._ipp._tcp.local.").unwrap();
        assert_eq!(name, "a.b");
        assert_eq!(service_type, "_ipp._tcp");
    }

    #[test]
    fn test_split_resolved_full_name_without_dot() {
        assert_eq!(split_resolved_full_name("nodotsatall"), None);
    }

    #[test]
    fn test_service_types_match_modulo_dots() {
        assert!(service_types_match("._ipp._tcp", "_ipp._tcp."));
        assert!(service_types_match("_ipp._tcp", "_ipp._tcp"));
        assert!(!service_types_match("._ipp._tcp", "_http._tcp."));
    }
}
