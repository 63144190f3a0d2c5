//! JSON-RPC endpoint.
//!
//! The router bridge forwards every RPC addressed to this platform's bus
//! identity as one `POST /v1/rpc` with a JSON-RPC 2.0 envelope. Replies are
//! always `200 OK` with a result or error envelope; only a missing caller
//! identity is rejected at the HTTP level.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use fleetlink_control::bacnet::parse_request;
use fleetlink_control::router::{error_reply, params};
use fleetlink_control::{Caller, ControlError, ManagedPlatform, Result};
use fleetlink_core::RpcParams;

use crate::auth::BusCaller;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// An inbound JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// Protocol version, `"2.0"`.
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Request id echoed in the reply.
    #[serde(default)]
    pub id: Value,
    /// Method name.
    pub method: String,
    /// Positional or named parameters.
    #[serde(default)]
    pub params: Value,
}

/// Positional-or-named access to RPC parameters.
struct Args<'a>(&'a Value);

impl<'a> Args<'a> {
    /// The parameter at `index` in a list, or under `name` in an object. A
    /// bare scalar counts as the first positional parameter.
    fn get(&self, index: usize, name: &str) -> Option<&'a Value> {
        match self.0 {
            Value::Array(items) => items.get(index),
            Value::Object(map) => map.get(name),
            Value::Null => None,
            scalar => (index == 0).then_some(scalar),
        }
    }

    fn str(&self, index: usize, name: &str) -> Result<&'a str> {
        self.get(index, name)
            .and_then(Value::as_str)
            .ok_or_else(|| ControlError::InvalidParams(format!("missing {name}")))
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| ControlError::Internal(e.to_string()))
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle one JSON-RPC request.
///
/// # Example
///
/// ```text
/// POST /v1/rpc
/// x-bus-identity: volttron.central
/// x-bus-publickey: <key>
/// {"jsonrpc": "2.0", "id": 1, "method": "manage", "params": ["tcp://10.0.0.1:22916"]}
///
/// Response: 200 OK
/// {"jsonrpc": "2.0", "id": 1, "result": "<platform key>"}
/// ```
pub async fn rpc<P>(
    State(state): State<Arc<GatewayState<P>>>,
    BusCaller(caller): BusCaller,
    Json(request): Json<RpcRequest>,
) -> Json<Value>
where
    P: ManagedPlatform + 'static,
{
    tracing::debug!(
        caller = %caller.identity,
        method = %request.method,
        "RPC request"
    );
    if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
        tracing::debug!(version = ?request.jsonrpc, "Non 2.0 JSON-RPC envelope");
    }

    let id = request.id;
    let reply = match dispatch(
        state.platform.as_ref(),
        &caller,
        &id,
        &request.method,
        request.params,
    )
    .await
    {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err(e) => {
            tracing::warn!(
                caller = %caller.identity,
                method = %request.method,
                error = %e,
                "RPC failed"
            );
            error_reply(&id, &e)
        }
    };

    Json(reply)
}

async fn dispatch<P: ManagedPlatform>(
    platform: &P,
    caller: &Caller,
    id: &Value,
    method: &str,
    params: Value,
) -> Result<Value> {
    let args = Args(&params);

    match method {
        "get_publickey" => Ok(json!(platform.get_publickey(caller).await?)),
        "get_health" => to_json(&platform.get_health()),
        "get_instance_uuid" | "get_instance_id" => Ok(json!(platform.get_instance_id())),
        "manage" => {
            let address = args.str(0, "address")?;
            Ok(json!(platform.manage(caller, address).await?))
        }
        "unmanage" => {
            platform.unmanage(caller).await?;
            Ok(Value::Null)
        }
        "list_agents" => to_json(&platform.list_agents().await?),
        "start_agent" => to_json(&platform.start_agent(&params::agent_uuid(&params)?).await?),
        "stop_agent" => to_json(&platform.stop_agent(&params::agent_uuid(&params)?).await?),
        "restart_agent" => {
            to_json(&platform.restart_agent(&params::agent_uuid(&params)?).await?)
        }
        "agent_status" => to_json(&platform.agent_status(&params::agent_uuid(&params)?).await?),
        "status_agents" => to_json(&platform.status_agents().await?),
        "get_public_keys" => platform.get_public_keys().await,
        "list_agent_methods" => Ok(platform.list_agent_methods(id)),
        "get_device" => to_json(&platform.get_device(args.str(0, "topic")?)),
        "get_devices" => to_json(&platform.get_devices()),
        "route_request" => {
            let request_id = args.get(0, "id").cloned().unwrap_or(Value::Null);
            let request_method = args.str(1, "method")?;
            let request_params = args.get(2, "params").cloned().unwrap_or(Value::Null);
            Ok(platform
                .route_request(request_id, request_method, request_params)
                .await)
        }
        "start_bacnet_scan" => {
            let request = parse_request(&RpcParams::from_value(params.clone()))?;
            platform.start_bacnet_scan(request).await?;
            Ok(Value::Null)
        }
        "publish_bacnet_props" => {
            let request = parse_request(&RpcParams::from_value(params.clone()))?;
            platform.publish_bacnet_props(request).await
        }
        other => Err(ControlError::MethodNotFound(other.to_string())),
    }
}
