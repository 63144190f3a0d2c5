//! Platform liaison between a local bus and a central console.
//!
//! This crate holds the liaison's business logic: it resolves and connects
//! to the console, registers this platform with it, answers the console's
//! management requests, tracks device telemetry and publishes platform
//! statistics.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Gateway (HTTP bridge + RPC)                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      PlatformService                        │
//! │  ┌────────────┐ ┌────────────┐ ┌───────────┐ ┌──────────┐   │
//! │  │  Config +  │ │ Connection │ │  Router   │ │ Devices  │   │
//! │  │ Discovery  │ │ + Retry    │ │           │ │ + Stats  │   │
//! │  └────────────┘ └────────────┘ └───────────┘ └──────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Store   │   │  Auth    │   │   Bus    │
//!        │ (RocksDB)│   │ (grants) │   │ (peers)  │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleetlink_auth::StoreAuthorizer;
//! use fleetlink_control::{ConfigAction, ConfigEvent, ManagedPlatform, PlatformConfig, PlatformService};
//! use fleetlink_core::Bus;
//! use fleetlink_store::RocksStore;
//!
//! # async fn example(bus: Arc<dyn Bus>) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/fleetlink")?);
//! let authorizer = Arc::new(StoreAuthorizer::new(Arc::clone(&store)));
//!
//! let service = Arc::new(PlatformService::with_defaults(
//!     bus,
//!     store,
//!     authorizer,
//!     PlatformConfig::default(),
//! ));
//! service.start();
//!
//! service
//!     .configure(ConfigEvent {
//!         name: "default_config".into(),
//!         action: ConfigAction::New,
//!         contents: serde_json::Value::Null,
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Registration
//!
//! The platform registers itself with the console every ten seconds until
//! the console answers with `manage`. See the [`registration`] module for
//! the state machine.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agents;
pub mod anonymize;
pub mod bacnet;
pub mod config;
pub mod connection;
pub mod control_client;
pub mod devices;
pub mod discovery;
pub mod error;
pub mod install;
pub mod registration;
pub mod retry;
pub mod router;
pub mod service;
pub mod sink;
pub mod stats;

pub use agents::{AgentSummary, Permissions};
pub use bacnet::{PropsRequest, ScanRequest, IAM_TOPIC};
pub use config::{ConfigAction, ConfigEvent, ConfigName, ConsoleConfig, PlatformConfig, TopicReplaceRule};
pub use control_client::{AgentStatusEntry, BusControlClient, ControlClient, LifecycleMethod, ProcessStatus};
pub use devices::{DeviceRecord, DeviceView, DEVICES_ROOT};
pub use error::{codes, ControlError, Result};
pub use registration::RegistrationState;
pub use service::{Collaborators, ManagedPlatform, PlatformService};

// Re-export commonly used types from dependencies for convenience
pub use fleetlink_auth::Caller;
pub use fleetlink_core::{AgentUuid, HealthStatus, InstanceId};
