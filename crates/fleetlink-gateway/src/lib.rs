//! HTTP front end for the fleetlink platform liaison.
//!
//! The native bus sockets are owned by a local router bridge. This crate
//! sits between that bridge and the platform service:
//!
//! - Inbound: the bridge forwards RPC calls addressed to the platform,
//!   publishes on subscribed topics, and configuration store events
//! - Outbound: [`HttpBus`] implements the bus contract by calling back into
//!   the bridge
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Router bridge                            │
//! │             (native bus sockets, console link)               │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                              ▲
//!                 ▼ rpc / pubsub / config        │ HttpBus
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    fleetlink-gateway                         │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐   │
//! │  │  Caller     │ │   Router    │ │    Bridge           │   │
//! │  │  Extractor  │ │  + Handlers │ │    Client           │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │ Platform │   │  Auth    │   │  Store   │
//!        │ Service  │   │ (caps)   │   │ (Rocks)  │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleetlink_auth::StoreAuthorizer;
//! use fleetlink_control::{PlatformConfig, PlatformService};
//! use fleetlink_gateway::{create_router, GatewayConfig, GatewayState, HttpBus};
//! use fleetlink_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/fleetlink")?);
//! let authorizer = Arc::new(StoreAuthorizer::new(Arc::clone(&store)));
//! let bus = Arc::new(HttpBus::new("http://127.0.0.1:8081", "platform.agent", "pk"));
//!
//! let platform = Arc::new(PlatformService::with_defaults(
//!     bus,
//!     store,
//!     authorizer,
//!     PlatformConfig::default(),
//! ));
//! platform.start();
//!
//! let app = create_router(GatewayState::new(platform, GatewayConfig::default()));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod bridge;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;

// Re-export key types for convenience
pub use auth::BusCaller;
pub use bridge::{HttpBus, HttpConnection};
