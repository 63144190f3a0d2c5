//! Configuration store events.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use fleetlink_control::{ConfigEvent, ManagedPlatform};

use crate::error::ApiError;
use crate::state::GatewayState;

/// Apply a configuration event.
///
/// # Errors
///
/// Returns `400 Bad Request` if the record is unknown or invalid. The
/// previous configuration stays in effect.
pub async fn configure<P>(
    State(state): State<Arc<GatewayState<P>>>,
    Json(event): Json<ConfigEvent>,
) -> Result<StatusCode, ApiError>
where
    P: ManagedPlatform + 'static,
{
    tracing::info!(name = %event.name, action = ?event.action, "Configuration event");
    state.platform.configure(event).await?;
    Ok(StatusCode::NO_CONTENT)
}
