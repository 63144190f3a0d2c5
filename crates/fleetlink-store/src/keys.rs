//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions to encode and decode keys for various indexes.
//! All keys are designed to support efficient prefix scans.

const SEPARATOR: u8 = 0;

/// Encode an authorization entry key (the credentials bytes).
#[must_use]
pub fn auth_key(credentials: &str) -> Vec<u8> {
    credentials.as_bytes().to_vec()
}

/// Encode a capability index key: `capability || 0x00 || credentials`.
///
/// Capability names never contain a NUL byte, so the separator keeps
/// `manager` from matching a `manager2` prefix scan.
#[must_use]
pub fn capability_key(capability: &str, credentials: &str) -> Vec<u8> {
    let mut key = capability_prefix(capability);
    key.extend_from_slice(credentials.as_bytes());
    key
}

/// Encode a capability prefix for scanning all entries holding it.
#[must_use]
pub fn capability_prefix(capability: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(capability.len() + 1);
    key.extend_from_slice(capability.as_bytes());
    key.push(SEPARATOR);
    key
}

/// Extract the credentials from a capability index key.
///
/// Returns `None` if the key has no separator or is not UTF-8.
#[must_use]
pub fn extract_credentials_from_capability_key(key: &[u8]) -> Option<String> {
    let split = key.iter().position(|b| *b == SEPARATOR)?;
    String::from_utf8(key[split + 1..].to_vec()).ok()
}

/// Encode a setting key (the setting name bytes).
#[must_use]
pub fn setting_key(name: &str) -> Vec<u8> {
    name.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_key_roundtrip() {
        let key = capability_key("manager", "Zm9vYmFy");
        assert_eq!(
            extract_credentials_from_capability_key(&key).as_deref(),
            Some("Zm9vYmFy")
        );
    }

    #[test]
    fn prefix_does_not_match_longer_capability() {
        let key = capability_key("manager2", "abc");
        assert!(!key.starts_with(&capability_prefix("manager")));
        assert!(key.starts_with(&capability_prefix("manager2")));
    }
}
