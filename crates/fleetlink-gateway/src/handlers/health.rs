//! Health check endpoint.
//!
//! This module provides the liveness endpoint polled by the router bridge.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use fleetlink_control::{HealthStatus, ManagedPlatform, RegistrationState};

use crate::state::GatewayState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Registration with the console.
    pub registration: RegistrationState,
    /// Hex instance id, once configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Platform health as last computed from device telemetry.
    pub platform: HealthStatus,
}

/// Health check handler.
///
/// # Example
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "registration": "NotRegistered",
///   "platform": {"status": "UNKNOWN", "context": null, "last_updated": "..."}
/// }
/// ```
pub async fn health<P>(State(state): State<Arc<GatewayState<P>>>) -> impl IntoResponse
where
    P: ManagedPlatform + 'static,
{
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        registration: state.platform.registration_state(),
        instance_id: state.platform.get_instance_id(),
        platform: state.platform.get_health(),
    };

    (StatusCode::OK, Json(response))
}
