//! Publishing to the console bus under this platform's topic prefix.

use std::sync::Arc;

use fleetlink_core::{ConnectTarget, Headers, InstanceId};
use parking_lot::RwLock;
use serde_json::Value;

use crate::connection::ConnectionManager;
use crate::error::Result;

/// Publishes messages to `platforms/<instance-id>/<leaf>` on the console.
pub struct ConsoleSink {
    connections: Arc<ConnectionManager>,
    instance_id: RwLock<Option<InstanceId>>,
    target: RwLock<Option<ConnectTarget>>,
}

impl ConsoleSink {
    /// Create a sink over the console connection.
    #[must_use]
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self {
            connections,
            instance_id: RwLock::new(None),
            target: RwLock::new(None),
        }
    }

    /// Set the instance id used in topics.
    pub fn set_instance_id(&self, id: Option<InstanceId>) {
        *self.instance_id.write() = id;
    }

    /// Set where to connect when no live console connection exists.
    pub fn set_target(&self, target: Option<ConnectTarget>) {
        *self.target.write() = target;
    }

    /// The instance id used in topics.
    #[must_use]
    pub fn instance_id(&self) -> Option<InstanceId> {
        *self.instance_id.read()
    }

    /// The full console topic for `leaf`.
    #[must_use]
    pub fn topic(&self, leaf: &str) -> Option<String> {
        self.instance_id()
            .map(|id| format!("platforms/{id}/{leaf}"))
    }

    /// Publish on the console connection. Returns false, after logging, if
    /// no connection can be obtained or the publish failed.
    pub async fn publish(&self, leaf: &str, message: &Value) -> bool {
        let Some(topic) = self.topic(leaf) else {
            tracing::error!(leaf = %leaf, "No instance id, cannot publish to console");
            return false;
        };
        self.publish_raw(&topic, message).await
    }

    /// Publish on the console connection using a full topic.
    pub async fn publish_raw(&self, topic: &str, message: &Value) -> bool {
        match self.try_publish_raw(topic, message).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::error!(topic = %topic, "No console connection, dropping publish");
                false
            }
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "Console publish failed");
                false
            }
        }
    }

    /// Publish using a full topic without logging. The connection is
    /// checked and rebuilt if needed; `Ok(false)` means none is available
    /// with the current configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting or the publish failed.
    pub async fn try_publish_raw(&self, topic: &str, message: &Value) -> Result<bool> {
        let target = self.target.read().clone();
        let Some(conn) = self.connections.get(target).await? else {
            return Ok(false);
        };
        conn.publish(topic, &Headers::new(), message).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetlink_core::mock::MockBus;
    use fleetlink_core::{identities, Connection};
    use serde_json::json;

    #[tokio::test]
    async fn publishes_under_instance_prefix() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        let connections = Arc::new(ConnectionManager::new(bus.clone()));
        connections
            .get(Some(ConnectTarget {
                address: "tcp://10.0.0.1:22916".into(),
                serverkey: "vc-sk".into(),
                peer: identities::CONSOLE.into(),
                identity: "bldg-1".into(),
            }))
            .await
            .unwrap();

        let sink = ConsoleSink::new(connections);
        let id = InstanceId::from_address("tcp://10.0.0.5:22916");
        sink.set_instance_id(Some(id));

        assert!(sink.publish("iam", &json!({"device_id": 1})).await);
        let published = bus.console().published();
        assert_eq!(published[0].topic, format!("platforms/{id}/iam"));
    }

    #[tokio::test]
    async fn publish_connects_to_target() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        let sink = ConsoleSink::new(Arc::new(ConnectionManager::new(bus.clone())));
        let id = InstanceId::from_address("tcp://10.0.0.5:22916");
        sink.set_instance_id(Some(id));
        sink.set_target(Some(ConnectTarget {
            address: "tcp://10.0.0.1:22916".into(),
            serverkey: "vc-sk".into(),
            peer: identities::CONSOLE.into(),
            identity: "bldg-1".into(),
        }));

        assert!(sink.publish("iam", &json!({"device_id": 1})).await);
        assert_eq!(bus.connect_count(), 1);
        assert_eq!(bus.console().published().len(), 1);

        // a dead session is replaced on the next publish
        bus.connections()[0].kill().await;
        assert!(sink.publish("iam", &json!({"device_id": 2})).await);
        assert_eq!(bus.connect_count(), 2);
    }

    #[tokio::test]
    async fn no_connection_drops() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        let sink = ConsoleSink::new(Arc::new(ConnectionManager::new(bus.clone())));
        sink.set_instance_id(Some(InstanceId::from_address("tcp://x")));

        assert!(!sink.publish("iam", &json!({})).await);
        assert!(bus.console().published().is_empty());
    }
}
