//! Client for the local control plane.
//!
//! The control plane (`control` identity) installs, starts, stops and reports
//! on the agents of this platform. This module wraps its RPC surface in typed
//! calls and decodes the tuple-shaped replies it returns.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetlink_core::{identities, AgentUuid, Bus, RpcParams};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ControlError, Result};

/// Timeout for control plane calls.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Process state of an agent as the control plane reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    /// OS process id, if the agent has been started.
    pub process_id: Option<i64>,
    /// Exit code, if the process has exited.
    pub return_code: Option<i64>,
}

impl ProcessStatus {
    /// Decode a `[pid, return_code]` pair. Null or an empty list is no status.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) if !items.is_empty() => Some(Self {
                process_id: items.first().and_then(Value::as_i64),
                return_code: items.get(1).and_then(Value::as_i64),
            }),
            _ => None,
        }
    }

    /// Whether the process is alive: it has a pid and has not exited.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!((self.process_id, self.return_code), (Some(pid), None) if pid > 0)
    }
}

/// One row of `status_agents`, reshaped into named fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatusEntry {
    /// Agent name.
    pub name: String,
    /// Agent uuid.
    pub uuid: String,
    /// OS process id.
    pub process_id: Option<i64>,
    /// Exit code.
    pub return_code: Option<i64>,
}

impl AgentStatusEntry {
    /// Decode a `[uuid, name, [pid, return_code]]` row.
    #[must_use]
    pub fn from_row(row: &Value) -> Option<Self> {
        let items = row.as_array()?;
        let uuid = items.first()?.as_str()?.to_string();
        let name = items.get(1)?.as_str()?.to_string();
        let status = items
            .get(2)
            .and_then(ProcessStatus::from_value)
            .unwrap_or_default();
        Some(Self {
            name,
            uuid,
            process_id: status.process_id,
            return_code: status.return_code,
        })
    }

    /// The process part of the row.
    #[must_use]
    pub const fn status(&self) -> ProcessStatus {
        ProcessStatus {
            process_id: self.process_id,
            return_code: self.return_code,
        }
    }
}

/// Agent lifecycle operations the control plane exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleMethod {
    /// Report process state.
    AgentStatus,
    /// Start the agent.
    StartAgent,
    /// Stop the agent.
    StopAgent,
    /// Uninstall the agent.
    RemoveAgent,
    /// Stop then start the agent.
    RestartAgent,
}

impl LifecycleMethod {
    /// The control plane method name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AgentStatus => "agent_status",
            Self::StartAgent => "start_agent",
            Self::StopAgent => "stop_agent",
            Self::RemoveAgent => "remove_agent",
            Self::RestartAgent => "restart_agent",
        }
    }

    /// Parse a method name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "agent_status" => Some(Self::AgentStatus),
            "start_agent" => Some(Self::StartAgent),
            "stop_agent" => Some(Self::StopAgent),
            "remove_agent" => Some(Self::RemoveAgent),
            "restart_agent" => Some(Self::RestartAgent),
            _ => None,
        }
    }
}

impl std::fmt::Display for LifecycleMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for control plane communication.
#[async_trait]
pub trait ControlClient: Send + Sync {
    /// Installed agents, as the control plane describes them.
    async fn list_agents(&self) -> Result<Vec<Map<String, Value>>>;

    /// Process state of every installed agent.
    async fn status_agents(&self) -> Result<Vec<AgentStatusEntry>>;

    /// Run a lifecycle operation and return the process state it reports.
    async fn lifecycle(
        &self,
        method: LifecycleMethod,
        uuid: &AgentUuid,
    ) -> Result<Option<ProcessStatus>>;

    /// The bus identity of an installed agent.
    async fn agent_vip_identity(&self, uuid: &AgentUuid) -> Result<Option<String>>;

    /// Install an agent package already on local disk; returns its uuid.
    async fn install_agent_local(&self, path: &str) -> Result<String>;

    /// Public keys of every installed agent.
    async fn agents_publickeys(&self) -> Result<Value>;
}

/// Control plane client speaking over the local bus.
#[derive(Clone)]
pub struct BusControlClient {
    bus: Arc<dyn Bus>,
}

impl BusControlClient {
    /// Create a client on `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus }
    }

    async fn call(&self, method: &str, params: RpcParams) -> Result<Value> {
        self.bus
            .call(identities::CONTROL, method, params, CONTROL_TIMEOUT)
            .await
            .map_err(ControlError::from)
    }
}

#[async_trait]
impl ControlClient for BusControlClient {
    async fn list_agents(&self) -> Result<Vec<Map<String, Value>>> {
        let value = self.call("list_agents", RpcParams::None).await?;
        match value {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect()),
            Value::Null => Ok(Vec::new()),
            other => Err(ControlError::Internal(format!(
                "unexpected list_agents reply: {other}"
            ))),
        }
    }

    async fn status_agents(&self) -> Result<Vec<AgentStatusEntry>> {
        let value = self.call("status_agents", RpcParams::None).await?;
        let rows = value.as_array().cloned().unwrap_or_default();
        Ok(rows
            .iter()
            .filter_map(|row| {
                let entry = AgentStatusEntry::from_row(row);
                if entry.is_none() {
                    tracing::warn!(row = %row, "Skipping malformed status_agents row");
                }
                entry
            })
            .collect())
    }

    async fn lifecycle(
        &self,
        method: LifecycleMethod,
        uuid: &AgentUuid,
    ) -> Result<Option<ProcessStatus>> {
        tracing::debug!(method = %method, uuid = %uuid, "Calling control plane");
        let value = self
            .call(method.as_str(), RpcParams::single(uuid.as_str()))
            .await?;
        Ok(ProcessStatus::from_value(&value))
    }

    async fn agent_vip_identity(&self, uuid: &AgentUuid) -> Result<Option<String>> {
        let value = self
            .call("agent_vip_identity", RpcParams::single(uuid.as_str()))
            .await?;
        Ok(value.as_str().filter(|s| !s.is_empty()).map(str::to_string))
    }

    async fn install_agent_local(&self, path: &str) -> Result<String> {
        let value = self
            .call("install_agent_local", RpcParams::single(path))
            .await?;
        value
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ControlError::Internal(format!("install returned no uuid for {path}")))
    }

    async fn agents_publickeys(&self) -> Result<Value> {
        self.call("get_agents_publickeys", RpcParams::None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetlink_core::mock::MockBus;
    use serde_json::json;

    fn uuid(s: &str) -> AgentUuid {
        AgentUuid::parse(s).unwrap()
    }

    #[test]
    fn process_status_decoding() {
        let running = ProcessStatus::from_value(&json!([1234, null])).unwrap();
        assert!(running.is_running());

        let exited = ProcessStatus::from_value(&json!([1234, 0])).unwrap();
        assert!(!exited.is_running());

        let never = ProcessStatus::from_value(&json!([null, null])).unwrap();
        assert!(!never.is_running());

        assert!(ProcessStatus::from_value(&Value::Null).is_none());
        assert!(ProcessStatus::from_value(&json!([])).is_none());
    }

    #[test]
    fn status_row_decoding() {
        let entry = AgentStatusEntry::from_row(&json!(["abc", "listeneragent-3.3", [42, null]]))
            .unwrap();
        assert_eq!(entry.uuid, "abc");
        assert_eq!(entry.name, "listeneragent-3.3");
        assert_eq!(entry.process_id, Some(42));
        assert_eq!(entry.return_code, None);

        assert!(AgentStatusEntry::from_row(&json!({"uuid": "abc"})).is_none());
    }

    #[test]
    fn lifecycle_method_names() {
        for m in [
            LifecycleMethod::AgentStatus,
            LifecycleMethod::StartAgent,
            LifecycleMethod::StopAgent,
            LifecycleMethod::RemoveAgent,
            LifecycleMethod::RestartAgent,
        ] {
            assert_eq!(LifecycleMethod::parse(m.as_str()), Some(m));
        }
        assert!(LifecycleMethod::parse("kill_agent").is_none());
    }

    #[tokio::test]
    async fn status_agents_reshapes_rows() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        bus.on_call(identities::CONTROL, "status_agents", |_| {
            Ok(json!([
                ["abc", "listener", [42, null]],
                ["def", "historian", [null, null]],
                "garbage"
            ]))
        });
        let client = BusControlClient::new(bus);

        let rows = client.status_agents().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].status().is_running());
        assert_eq!(rows[1].process_id, None);
    }

    #[tokio::test]
    async fn lifecycle_passes_uuid() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        bus.on_call(identities::CONTROL, "start_agent", |_| Ok(json!([77, null])));
        bus.on_call(identities::CONTROL, "stop_agent", |_| Ok(Value::Null));
        let client = BusControlClient::new(bus.clone());

        let started = client
            .lifecycle(LifecycleMethod::StartAgent, &uuid("abc"))
            .await
            .unwrap();
        assert_eq!(started.unwrap().process_id, Some(77));

        let stopped = client
            .lifecycle(LifecycleMethod::StopAgent, &uuid("abc"))
            .await
            .unwrap();
        assert!(stopped.is_none());

        let calls = bus.calls_to(identities::CONTROL, "start_agent");
        assert_eq!(calls[0].params, RpcParams::single("abc"));
    }

    #[tokio::test]
    async fn control_unreachable() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        let client = BusControlClient::new(bus);
        let err = client.list_agents().await.unwrap_err();
        assert!(matches!(err, ControlError::Unreachable(_)));
    }

    #[tokio::test]
    async fn install_requires_uuid() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        bus.on_call(identities::CONTROL, "install_agent_local", |params| {
            match params {
                RpcParams::Positional(items) if items[0] == json!("/tmp/good.whl") => {
                    Ok(json!("new-uuid"))
                }
                _ => Ok(Value::Null),
            }
        });
        let client = BusControlClient::new(bus);

        assert_eq!(
            client.install_agent_local("/tmp/good.whl").await.unwrap(),
            "new-uuid"
        );
        assert!(client.install_agent_local("/tmp/bad.whl").await.is_err());
    }
}
