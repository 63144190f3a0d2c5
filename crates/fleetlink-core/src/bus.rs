//! The message-bus contract.
//!
//! The platform liaison never speaks the bus wire protocol itself. It relies
//! on a [`Bus`] for local traffic (peer list, RPC, pubsub, router queries)
//! and on a [`Connection`] for the single authenticated session to the
//! console. Every call across this boundary carries an explicit timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Message headers attached to a publish.
pub type Headers = BTreeMap<String, String>;

/// Header set by the forwarder on messages relayed from another platform.
pub const FORWARDED_HEADER: &str = "X-Forwarded";

/// A result type using `BusError`.
pub type BusResult<T> = std::result::Result<T, BusError>;

/// Errors raised by bus operations.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// The addressed peer is not connected to the bus.
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    /// The operation did not complete in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The remote side raised an error.
    #[error("remote error {code}: {message}")]
    Remote {
        /// Remote error code.
        code: i64,
        /// Remote error message.
        message: String,
    },

    /// The connection was closed or never established.
    #[error("connection closed")]
    Disconnected,

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl BusError {
    /// Returns true if retrying the same operation later may succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::Timeout(_) | Self::Disconnected | Self::Transport(_)
        )
    }
}

/// Parameters for a remote procedure call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcParams {
    /// No parameters.
    #[default]
    None,
    /// Positional parameters.
    Positional(Vec<Value>),
    /// Keyword parameters.
    Named(Map<String, Value>),
}

impl RpcParams {
    /// Build parameters from a JSON value: arrays are positional, objects are
    /// named, anything else (including an empty array or object) is none.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) if !items.is_empty() => Self::Positional(items),
            Value::Object(map) if !map.is_empty() => Self::Named(map),
            Value::Array(_) | Value::Object(_) | Value::Null => Self::None,
            other => Self::Positional(vec![other]),
        }
    }

    /// Shorthand for a single positional argument.
    #[must_use]
    pub fn single(value: impl Into<Value>) -> Self {
        Self::Positional(vec![value.into()])
    }

    /// Shorthand for named parameters built from pairs.
    #[must_use]
    pub fn named<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Named(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Render the parameters back into a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::None => Value::Null,
            Self::Positional(items) => Value::Array(items.clone()),
            Self::Named(map) => Value::Object(map.clone()),
        }
    }
}

/// Where and how to open a connection to a remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectTarget {
    /// Native bus address (`tcp://` or `ipc://`).
    pub address: String,
    /// Server key of the remote bus.
    pub serverkey: String,
    /// Identity of the peer to talk to on the remote bus.
    pub peer: String,
    /// Identity this node presents on the remote bus.
    pub identity: String,
}

/// An open session to one remote peer.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Identity of the remote peer this session talks to.
    fn peer(&self) -> &str;

    /// Address the session was opened against, or `None` for a session
    /// routed over the local bus.
    fn address(&self) -> Option<&str>;

    /// Whether the underlying transport is up.
    async fn is_connected(&self, timeout: Duration) -> bool;

    /// Whether the remote peer answers on the transport.
    async fn is_peer_connected(&self, timeout: Duration) -> bool;

    /// Call a method on the remote peer.
    async fn call(&self, method: &str, params: RpcParams, timeout: Duration) -> BusResult<Value>;

    /// Publish a message on the remote bus.
    async fn publish(&self, topic: &str, headers: &Headers, message: &Value) -> BusResult<()>;

    /// Tear the session down. Idempotent.
    async fn kill(&self);
}

/// The local message bus as seen by the platform liaison.
#[async_trait]
pub trait Bus: Send + Sync {
    /// This agent's identity on the local bus.
    fn identity(&self) -> &str;

    /// This agent's public key.
    fn public_key(&self) -> String;

    /// Identities currently connected to the local bus.
    async fn peers(&self, timeout: Duration) -> BusResult<Vec<String>>;

    /// Call a method on a local peer.
    async fn call(
        &self,
        peer: &str,
        method: &str,
        params: RpcParams,
        timeout: Duration,
    ) -> BusResult<Value>;

    /// Publish a message on the local bus.
    async fn publish(&self, topic: &str, headers: &Headers, message: &Value) -> BusResult<()>;

    /// Query a router fact such as `addresses` or `serverkey`.
    async fn query(&self, key: &str, timeout: Duration) -> BusResult<Value>;

    /// Open a session to a peer on a remote bus.
    async fn connect(&self, target: &ConnectTarget) -> BusResult<Arc<dyn Connection>>;

    /// Open a session to a peer already connected to the local bus.
    async fn connect_local(&self, peer: &str) -> BusResult<Arc<dyn Connection>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_from_value_shapes() {
        assert_eq!(
            RpcParams::from_value(json!([1, 2])),
            RpcParams::Positional(vec![json!(1), json!(2)])
        );
        assert!(matches!(
            RpcParams::from_value(json!({"a": 1})),
            RpcParams::Named(_)
        ));
        assert_eq!(RpcParams::from_value(json!([])), RpcParams::None);
        assert_eq!(RpcParams::from_value(json!({})), RpcParams::None);
        assert_eq!(RpcParams::from_value(Value::Null), RpcParams::None);
        assert_eq!(
            RpcParams::from_value(json!("abc")),
            RpcParams::single("abc")
        );
    }

    #[test]
    fn retriable_errors() {
        assert!(BusError::Timeout("list_agents".into()).is_retriable());
        assert!(BusError::Disconnected.is_retriable());
        assert!(!BusError::Remote {
            code: -32601,
            message: "nope".into()
        }
        .is_retriable());
    }
}
