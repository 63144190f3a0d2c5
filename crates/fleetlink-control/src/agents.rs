//! Agent inventory as shown to the console.
//!
//! Combines the control plane's agent listing with process state, console
//! permissions and each running agent's self-reported health.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fleetlink_core::{identities, AgentUuid, Bus, RpcParams};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::control_client::{ControlClient, ProcessStatus};
use crate::error::Result;

/// Timeout for an agent's `health.get_status`.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Agent name fragments of the console and of this service; such agents
/// may not be stopped or removed from the console.
const PROTECTED_NAMES: [&str; 2] = ["volttroncentral", "vcplatform"];

/// What the console may do with an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// The agent may be stopped.
    pub can_stop: bool,
    /// The agent may be started.
    pub can_start: bool,
    /// The agent may be restarted.
    pub can_restart: bool,
    /// The agent may be uninstalled.
    pub can_remove: bool,
}

impl Permissions {
    /// Permissions for an agent in the given state.
    #[must_use]
    pub const fn for_agent(is_running: bool, protected: bool) -> Self {
        Self {
            can_stop: is_running && !protected,
            can_start: !is_running,
            can_restart: true,
            can_remove: !protected,
        }
    }
}

/// One agent in the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Fields reported by the control plane (`uuid`, `name`, `identity`, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    /// Whether the process is alive.
    pub is_running: bool,
    /// OS process id.
    pub process_id: Option<i64>,
    /// Exit code of a finished process.
    pub error_code: Option<i64>,
    /// Console permissions.
    pub permissions: Permissions,
    /// Health reported by the agent, or UNKNOWN.
    pub health: Value,
}

impl AgentSummary {
    fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// The agent's uuid.
    #[must_use]
    pub fn uuid(&self) -> Option<&str> {
        self.field("uuid")
    }

    /// The agent's name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.field("name")
    }
}

/// Health reported for agents that are not running or did not answer.
#[must_use]
pub fn unknown_health() -> Value {
    json!({"status": "UNKNOWN", "context": null, "last_updated": null})
}

fn is_protected(fields: &Map<String, Value>) -> bool {
    let name = fields.get("name").and_then(Value::as_str).unwrap_or_default();
    let identity = fields
        .get("identity")
        .and_then(Value::as_str)
        .unwrap_or_default();
    PROTECTED_NAMES.iter().any(|p| name.contains(p))
        || identity == identities::CONSOLE
        || identity == identities::PLATFORM
}

/// Builds the agent inventory.
pub struct AgentInventory {
    bus: Arc<dyn Bus>,
    control: Arc<dyn ControlClient>,
}

impl AgentInventory {
    /// Create an inventory over the local bus and control plane.
    #[must_use]
    pub fn new(bus: Arc<dyn Bus>, control: Arc<dyn ControlClient>) -> Self {
        Self { bus, control }
    }

    /// List every installed agent with state, permissions and health.
    ///
    /// # Errors
    ///
    /// Returns an error if the control plane cannot list agents. Health
    /// failures for single agents are logged and leave UNKNOWN.
    pub async fn list(&self) -> Result<Vec<AgentSummary>> {
        let agents = self.control.list_agents().await?;
        let statuses: HashMap<String, ProcessStatus> = self
            .control
            .status_agents()
            .await?
            .into_iter()
            .map(|entry| (entry.uuid.clone(), entry.status()))
            .collect();

        let mut summaries = Vec::with_capacity(agents.len());
        for fields in agents {
            let status = fields
                .get("uuid")
                .and_then(Value::as_str)
                .and_then(|uuid| statuses.get(uuid))
                .copied()
                .unwrap_or_default();
            let is_running = status.is_running();

            let mut summary = AgentSummary {
                permissions: Permissions::for_agent(is_running, is_protected(&fields)),
                fields,
                is_running,
                process_id: status.process_id,
                error_code: status.return_code,
                health: unknown_health(),
            };

            if is_running {
                if let Some(health) = self.agent_health(&summary).await {
                    summary.health = health;
                }
            }
            summaries.push(summary);
        }

        Ok(summaries)
    }

    async fn agent_health(&self, summary: &AgentSummary) -> Option<Value> {
        let uuid = summary.uuid().and_then(|u| AgentUuid::parse(u).ok())?;

        let identity = match self.control.agent_vip_identity(&uuid).await {
            Ok(Some(identity)) => identity,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(uuid = %uuid, error = %e, "Could not resolve agent identity");
                return None;
            }
        };

        match self
            .bus
            .call(&identity, "health.get_status", RpcParams::None, HEALTH_TIMEOUT)
            .await
        {
            Ok(Value::Null) => None,
            Ok(health) => Some(health),
            Err(e) => {
                tracing::warn!(identity = %identity, error = %e, "Agent health query failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_client::BusControlClient;
    use fleetlink_core::mock::MockBus;

    fn inventory(bus: &Arc<MockBus>) -> AgentInventory {
        let control = Arc::new(BusControlClient::new(bus.clone()));
        AgentInventory::new(bus.clone(), control)
    }

    fn seed(bus: &MockBus) {
        bus.on_call(identities::CONTROL, "list_agents", |_| {
            Ok(json!([
                {"uuid": "abc", "name": "listeneragent-3.3", "identity": "listener"},
                {"uuid": "def", "name": "historianagent-1.0", "identity": "historian"},
                {"uuid": "vcp", "name": "vcplatformagent-4.0", "identity": "platform.agent"}
            ]))
        });
        bus.on_call(identities::CONTROL, "status_agents", |_| {
            Ok(json!([
                ["abc", "listeneragent-3.3", [100, null]],
                ["def", "historianagent-1.0", [200, 1]],
                ["vcp", "vcplatformagent-4.0", [300, null]]
            ]))
        });
        bus.on_call(identities::CONTROL, "agent_vip_identity", |params| {
            match params {
                RpcParams::Positional(items) if items[0] == json!("abc") => Ok(json!("listener")),
                _ => Ok(json!("platform.agent")),
            }
        });
        bus.on_call("listener", "health.get_status", |_| {
            Ok(json!({"status": "GOOD", "context": null, "last_updated": "2026-01-01T00:00:00Z"}))
        });
    }

    #[tokio::test]
    async fn list_enriches_agents() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        seed(&bus);

        let agents = inventory(&bus).list().await.unwrap();
        assert_eq!(agents.len(), 3);

        let listener = &agents[0];
        assert!(listener.is_running);
        assert_eq!(listener.process_id, Some(100));
        assert!(listener.permissions.can_stop);
        assert!(!listener.permissions.can_start);
        assert_eq!(listener.health["status"], "GOOD");
        assert_eq!(listener.name(), Some("listeneragent-3.3"));

        let historian = &agents[1];
        assert!(!historian.is_running);
        assert_eq!(historian.error_code, Some(1));
        assert!(historian.permissions.can_start);
        assert_eq!(historian.health, unknown_health());
    }

    #[tokio::test]
    async fn own_agent_cannot_be_stopped_or_removed() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        seed(&bus);

        let agents = inventory(&bus).list().await.unwrap();
        let own = &agents[2];
        assert!(own.is_running);
        assert!(!own.permissions.can_stop);
        assert!(!own.permissions.can_remove);
        assert!(own.permissions.can_restart);
    }

    #[tokio::test]
    async fn health_failure_leaves_unknown() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        seed(&bus);
        bus.remove_peer("listener");

        let agents = inventory(&bus).list().await.unwrap();
        assert_eq!(agents[0].health, unknown_health());
    }

    #[tokio::test]
    async fn summary_serializes_flat() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        seed(&bus);

        let agents = inventory(&bus).list().await.unwrap();
        let value = serde_json::to_value(&agents[0]).unwrap();
        assert_eq!(value["uuid"], "abc");
        assert_eq!(value["permissions"]["can_restart"], true);
    }
}
