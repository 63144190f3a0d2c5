//! Common error types for fleetlink.
//!
//! This module provides shared error types that are used across multiple crates.

use crate::bus::BusError;
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the fleetlink system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// A bus operation failed.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
