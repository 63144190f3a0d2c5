//! Authorization error types.

use fleetlink_store::StoreError;
use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur during authorization.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The public key is not a 43 character base64url encoded 32 byte key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The caller presented no public key.
    #[error("caller has no credentials")]
    MissingCredentials,

    /// The caller lacks the required capability.
    #[error("caller {identity} lacks capability {capability}")]
    Forbidden {
        /// Identity of the caller.
        identity: String,
        /// Capability that was required.
        capability: String,
    },

    /// The authorization store failed.
    #[error("auth store error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Returns `true` if the same request may succeed later.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_retriable())
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidPublicKey(_) => 400,
            Self::MissingCredentials => 401,
            Self::Forbidden { .. } => 403,
            Self::Store(_) => 500,
        }
    }
}
