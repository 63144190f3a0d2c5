//! Router replies.

use serde_json::{json, Value};

use crate::error::ControlError;

/// Normalize a successful reply: an object with a `result` key yields that
/// value, an object with a `code` key yields the code, anything else is
/// returned unchanged.
#[must_use]
pub fn normalize_result(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("result") => {
            map.remove("result").unwrap_or(Value::Null)
        }
        Value::Object(mut map) if map.contains_key("code") => {
            map.remove("code").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// A JSON-RPC error envelope.
#[must_use]
pub fn error_envelope(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message},
    })
}

/// A JSON-RPC error envelope for `err`.
#[must_use]
pub fn error_reply(id: &Value, err: &ControlError) -> Value {
    error_envelope(id, err.rpc_code(), &err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;

    #[test]
    fn normalization() {
        assert_eq!(normalize_result(json!({"result": [1, 2]})), json!([1, 2]));
        assert_eq!(normalize_result(json!({"code": 404, "msg": "x"})), json!(404));
        assert_eq!(normalize_result(Value::Null), Value::Null);
        assert_eq!(normalize_result(json!({"a": 1})), json!({"a": 1}));
        assert_eq!(normalize_result(json!("ok")), json!("ok"));
    }

    #[test]
    fn envelope_shape() {
        let reply = error_reply(&json!(7), &ControlError::InvalidParams("missing uuid".into()));
        assert_eq!(reply["jsonrpc"], "2.0");
        assert_eq!(reply["id"], 7);
        assert_eq!(reply["error"]["code"], codes::INVALID_PARAMS);
        assert!(reply["error"]["message"]
            .as_str()
            .unwrap()
            .contains("missing uuid"));
    }
}
