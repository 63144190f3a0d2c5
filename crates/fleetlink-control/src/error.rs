//! Error types for the platform liaison.
//!
//! This module defines all errors that can occur while resolving the console,
//! maintaining the console connection, and routing console requests.

use fleetlink_core::BusError;
use thiserror::Error;

use crate::registration::RegistrationState;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// JSON-RPC error codes used in router replies.
pub mod codes {
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// The parameters have the wrong shape.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Anything else.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// The addressed peer is not reachable.
    pub const UNREACHABLE: i64 = -32000;
    /// The call did not complete in time.
    pub const TIMEOUT: i64 = -32001;
    /// The caller lacks a required capability.
    pub const UNAUTHORIZED: i64 = -32003;
}

/// Errors that can occur in platform liaison operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The console address has an unsupported scheme.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Request parameters have the wrong shape.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The router has no handler for the method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// A peer could not be reached.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// An outbound call did not complete in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The remote peer answered with an error.
    #[error("remote error {code}: {message}")]
    Remote {
        /// Remote error code.
        code: i64,
        /// Remote error message.
        message: String,
    },

    /// HTTP discovery of the console failed.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// A configuration record could not be applied.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The requested registration state change is not allowed.
    #[error("invalid registration transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// The current state.
        from: RegistrationState,
        /// The requested state.
        to: RegistrationState,
    },

    /// Authorization error.
    #[error("authorization error: {0}")]
    Auth(#[from] fleetlink_auth::AuthError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] fleetlink_store::StoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<BusError> for ControlError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Unreachable(peer) => Self::Unreachable(peer),
            BusError::Timeout(op) => Self::Timeout(op),
            BusError::Remote { code, message } => Self::Remote { code, message },
            BusError::Disconnected => Self::Unreachable("connection closed".to_string()),
            BusError::Transport(msg) => Self::Internal(msg),
        }
    }
}

impl ControlError {
    /// Returns the JSON-RPC error code for this error.
    #[must_use]
    pub const fn rpc_code(&self) -> i64 {
        match self {
            Self::InvalidParams(_) | Self::InvalidAddress(_) => codes::INVALID_PARAMS,
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::Unreachable(_) => codes::UNREACHABLE,
            Self::Timeout(_) => codes::TIMEOUT,
            Self::Remote { code, .. } => *code,
            Self::Auth(_) => codes::UNAUTHORIZED,
            Self::Discovery(_)
            | Self::InvalidConfig(_)
            | Self::InvalidTransition { .. }
            | Self::Store(_)
            | Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::Timeout(_) | Self::Discovery(_) | Self::Store(_)
        )
    }
}
