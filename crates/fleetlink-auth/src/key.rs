//! Bus public keys.

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthError, Result};

/// Length of an encoded public key.
pub const PUBLIC_KEY_LEN: usize = 43;

/// A Curve25519 public key in unpadded base64url form.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey(String);

impl PublicKey {
    /// Parse and validate an encoded public key.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidPublicKey` if the key is not exactly 43
    /// characters, surrounding whitespace included, or does not decode to
    /// 32 bytes.
    pub fn parse(encoded: &str) -> Result<Self> {
        if encoded.len() != PUBLIC_KEY_LEN {
            return Err(AuthError::InvalidPublicKey(format!(
                "expected {PUBLIC_KEY_LEN} characters, got {}",
                encoded.len()
            )));
        }

        let bytes = BASE64_URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| AuthError::InvalidPublicKey(format!("invalid base64: {e}")))?;
        if bytes.len() != 32 {
            return Err(AuthError::InvalidPublicKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        Ok(Self(encoded.to_string()))
    }

    /// Borrow the encoded key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PublicKey {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(byte: u8) -> String {
        BASE64_URL_SAFE_NO_PAD.encode([byte; 32])
    }

    #[test]
    fn accepts_32_byte_key() {
        let raw = encoded(7);
        assert_eq!(raw.len(), PUBLIC_KEY_LEN);
        let key = PublicKey::parse(&raw).unwrap();
        assert_eq!(key.as_str(), raw);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            PublicKey::parse("short"),
            Err(AuthError::InvalidPublicKey(_))
        ));
        assert!(PublicKey::parse("").is_err());
    }

    #[test]
    fn rejects_surrounding_whitespace() {
        let raw = encoded(7);
        for padded in [format!(" {raw}"), format!("{raw}\n"), format!("\t{raw} ")] {
            assert!(matches!(
                PublicKey::parse(&padded),
                Err(AuthError::InvalidPublicKey(_))
            ));
        }
        let spaced = format!("{} ", &raw[..PUBLIC_KEY_LEN - 1]);
        assert!(PublicKey::parse(&spaced).is_err());
    }

    #[test]
    fn rejects_non_base64() {
        let bad = "!".repeat(PUBLIC_KEY_LEN);
        assert!(matches!(
            PublicKey::parse(&bad),
            Err(AuthError::InvalidPublicKey(_))
        ));
    }
}
