//! Core types and utilities for fleetlink.
//!
//! This crate provides the foundational types used throughout the platform
//! liaison:
//!
//! - **Identifiers**: the platform instance id, agent uuids, well-known peers
//! - **Bus contract**: the [`Bus`] and [`Connection`] traits every component
//!   talks through, with [`RpcParams`] and [`BusError`]
//! - **Health**: the GOOD / BAD / UNKNOWN status reported for devices,
//!   agents and the platform itself
//! - **Error types**: common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use fleetlink_core::{InstanceId, RpcParams};
//! use serde_json::json;
//!
//! let id = InstanceId::from_address("tcp://10.0.0.5:22916");
//! assert_eq!(id.to_hex().len(), 64);
//!
//! let params = RpcParams::from_value(json!({"uuid": "abc"}));
//! assert!(matches!(params, RpcParams::Named(_)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bus;
pub mod error;
pub mod health;
pub mod ids;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use bus::{
    Bus, BusError, BusResult, ConnectTarget, Connection, Headers, RpcParams, FORWARDED_HEADER,
};
pub use error::{CoreError, Result};
pub use health::{HealthStatus, Status};
pub use ids::{identities, AgentUuid, IdError, InstanceId};
