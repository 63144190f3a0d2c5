//! Inbound publish endpoint.
//!
//! The router bridge forwards publishes on the topics this platform
//! subscribes to: device telemetry under `devices/` ending in `/all`, and
//! BACnet I-Am announcements.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use fleetlink_control::{ManagedPlatform, DEVICES_ROOT, IAM_TOPIC};
use fleetlink_core::Headers;

use crate::state::GatewayState;

/// A publish delivered by the bridge.
#[derive(Debug, Deserialize)]
pub struct InboundPublish {
    /// Bus identity of the publisher.
    #[serde(default)]
    pub sender: String,
    /// Topic the message was published on.
    pub topic: String,
    /// Message headers.
    #[serde(default)]
    pub headers: Headers,
    /// Message body.
    #[serde(default)]
    pub message: Value,
}

/// Whether `topic` is a device's all-points publish.
#[must_use]
pub fn is_device_topic(topic: &str) -> bool {
    topic
        .strip_prefix(DEVICES_ROOT)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| rest.ends_with("/all"))
}

/// Deliver one inbound publish.
///
/// Always answers `202 Accepted`; publishes on other topics are ignored.
pub async fn publish<P>(
    State(state): State<Arc<GatewayState<P>>>,
    Json(body): Json<InboundPublish>,
) -> StatusCode
where
    P: ManagedPlatform + 'static,
{
    if is_device_topic(&body.topic) {
        state
            .platform
            .on_device_message(&body.topic, &body.headers, &body.message)
            .await;
    } else if body.topic == IAM_TOPIC {
        state.platform.on_iam(&body.sender, &body.message).await;
    } else {
        tracing::debug!(topic = %body.topic, "Ignoring publish on unsubscribed topic");
    }

    StatusCode::ACCEPTED
}
