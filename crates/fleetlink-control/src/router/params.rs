//! Extraction of router request parameters.

use fleetlink_core::AgentUuid;
use serde_json::Value;

use crate::error::{ControlError, Result};

/// The agent uuid of a lifecycle request: a one-element list, a bare
/// string, or an object with a `uuid` key.
///
/// # Errors
///
/// Returns `ControlError::InvalidParams` for any other shape.
pub fn agent_uuid(params: &Value) -> Result<AgentUuid> {
    let raw = match params {
        Value::Array(items) if items.len() == 1 => items[0].as_str(),
        Value::Array(items) => {
            return Err(ControlError::InvalidParams(format!(
                "expected exactly one agent uuid, got {}",
                items.len()
            )))
        }
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => {
            let uuid = map
                .get("uuid")
                .ok_or_else(|| ControlError::InvalidParams("missing uuid".to_string()))?;
            uuid.as_str()
        }
        _ => None,
    };

    let raw = raw.ok_or_else(|| ControlError::InvalidParams("uuid must be a string".to_string()))?;
    AgentUuid::parse(raw).map_err(|e| ControlError::InvalidParams(format!("invalid uuid: {e}")))
}

/// A named parameter that must be present.
///
/// # Errors
///
/// Returns `ControlError::InvalidParams` if `params` is not an object or
/// lacks `key`.
pub fn required<'a>(params: &'a Value, key: &str) -> Result<&'a Value> {
    params
        .as_object()
        .and_then(|map| map.get(key))
        .ok_or_else(|| ControlError::InvalidParams(format!("missing {key}")))
}

/// A named string parameter that must be present.
///
/// # Errors
///
/// Returns `ControlError::InvalidParams` if the parameter is missing or not
/// a string.
pub fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    required(params, key)?
        .as_str()
        .ok_or_else(|| ControlError::InvalidParams(format!("{key} must be a string")))
}
