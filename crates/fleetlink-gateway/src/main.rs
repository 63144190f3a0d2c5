//! Fleetlink platform liaison.
//!
//! This is the main entry point for the platform agent. It serves the HTTP
//! endpoints the router bridge calls and reaches the bus through the same
//! bridge.
//!
//! # Environment
//!
//! - `LISTEN_ADDR` - address to serve on (default `127.0.0.1:8080`)
//! - `DATA_DIR` - RocksDB directory (default `/var/lib/fleetlink`)
//! - `BRIDGE_URL` - router bridge base URL (default `http://127.0.0.1:8081`)
//! - `PLATFORM_IDENTITY` - this agent's bus identity (default `platform.agent`)
//! - `PLATFORM_PUBLICKEY` - this agent's public key (required)
//! - `CONFIG_PATH` - packaged JSON configuration, applied as `default_config`
//!
//! `default_config` is always applied at startup, empty when `CONFIG_PATH`
//! is unset. If the router cannot be queried yet the service keeps running
//! and applies it again on the next registration tick.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetlink_auth::StoreAuthorizer;
use fleetlink_control::{
    ConfigAction, ConfigEvent, ConfigName, ManagedPlatform, PlatformConfig, PlatformService,
};
use fleetlink_core::identities;
use fleetlink_gateway::{create_router, GatewayConfig, GatewayState, HttpBus};
use fleetlink_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleetlink=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting fleetlink platform agent");

    // Load configuration from environment
    let mut gateway_config = GatewayConfig::default();
    if let Ok(addr) = std::env::var("LISTEN_ADDR") {
        gateway_config.listen_addr = addr;
    }
    if let Ok(url) = std::env::var("BRIDGE_URL") {
        gateway_config.bridge_url = url;
    }
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "/var/lib/fleetlink".into());
    let identity =
        std::env::var("PLATFORM_IDENTITY").unwrap_or_else(|_| identities::PLATFORM.into());
    let public_key = std::env::var("PLATFORM_PUBLICKEY")?;
    let config_path = std::env::var("CONFIG_PATH").ok();

    tracing::info!(
        listen_addr = %gateway_config.listen_addr,
        bridge_url = %gateway_config.bridge_url,
        data_dir = %data_dir,
        identity = %identity,
        config_path = ?config_path,
        "Platform configuration loaded"
    );

    // Packaged configuration
    let packaged = match &config_path {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path).await?;
            Some(serde_json::from_str::<serde_json::Value>(&raw)?)
        }
        None => None,
    };
    let defaults = match &packaged {
        Some(value) => PlatformConfig::from_json(value.clone())?,
        None => PlatformConfig::default(),
    };

    // Initialize RocksDB store
    tracing::info!(path = %data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&data_dir)?);
    let authorizer = Arc::new(StoreAuthorizer::new(Arc::clone(&store)));
    let bus = Arc::new(HttpBus::new(
        gateway_config.bridge_url.clone(),
        identity,
        public_key,
    ));

    let platform = Arc::new(PlatformService::with_defaults(
        bus, store, authorizer, defaults,
    ));
    platform.start();

    let default_event = ConfigEvent {
        name: ConfigName::Default.as_str().to_string(),
        action: ConfigAction::New,
        contents: packaged.unwrap_or_else(|| serde_json::json!({})),
    };
    if let Err(e) = platform.configure(default_event).await {
        tracing::warn!(error = %e, "Default configuration not applied yet");
    }
    tracing::info!("Platform service initialized");

    let listen_addr = gateway_config.listen_addr.clone();
    let app = create_router(GatewayState::new(Arc::clone(&platform), gateway_config));

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("Shutting down");
    platform.shutdown().await;

    Ok(())
}
