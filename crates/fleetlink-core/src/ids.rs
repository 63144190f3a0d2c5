//! Core identifier types for fleetlink.
//!
//! This module provides strongly-typed identifiers for the local platform
//! instance and the agents it hosts, plus the well-known bus identities the
//! platform liaison talks to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Well-known peer identities on the local bus.
pub mod identities {
    /// The remote fleet-management console.
    pub const CONSOLE: &str = "volttron.central";
    /// The platform liaison itself.
    pub const PLATFORM: &str = "platform.agent";
    /// The platform historian.
    pub const HISTORIAN: &str = "platform.historian";
    /// The local control plane that installs and runs agents.
    pub const CONTROL: &str = "control";
}

/// A 32-byte platform instance identifier, hex-encoded for display.
///
/// The identifier is the blake3 digest of the instance's first external
/// bus address, so it is stable for as long as the address is.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceId([u8; 32]);

impl InstanceId {
    /// Create a new `InstanceId` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the `InstanceId` for an external bus address.
    #[must_use]
    pub fn from_address(address: &str) -> Self {
        Self(*blake3::hash(address.as_bytes()).as_bytes())
    }

    /// Parse an `InstanceId` from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not exactly 64 characters.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        let bytes = hex::decode(s).map_err(|_| IdError::InvalidHex)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            expected: 32,
            got: s.len() / 2,
        })?;
        Ok(Self(arr))
    }

    /// Return the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Return the hex-encoded string representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.to_hex())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for InstanceId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<InstanceId> for String {
    fn from(id: InstanceId) -> Self {
        id.to_hex()
    }
}

/// Identifier the control plane assigns to an installed agent.
///
/// The control plane owns the format; this type only guarantees the value is
/// non-empty and free of the `.` separator used by dotted router methods.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentUuid(String);

impl AgentUuid {
    /// Parse an `AgentUuid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty or contains a `.`.
    pub fn parse(s: impl Into<String>) -> Result<Self, IdError> {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(IdError::Empty);
        }
        if s.contains('.') {
            return Err(IdError::InvalidCharacter('.'));
        }
        Ok(Self(s))
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AgentUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentUuid({})", self.0)
    }
}

impl fmt::Display for AgentUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AgentUuid {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AgentUuid {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<AgentUuid> for String {
    fn from(id: AgentUuid) -> Self {
        id.0
    }
}

impl AsRef<str> for AgentUuid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The string is not valid hexadecimal.
    #[error("invalid hex encoding")]
    InvalidHex,

    /// The decoded bytes have the wrong length.
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes.
        got: usize,
    },

    /// The identifier is empty.
    #[error("identifier is empty")]
    Empty,

    /// The identifier contains a character it may not contain.
    #[error("identifier contains invalid character {0:?}")]
    InvalidCharacter(char),
}
