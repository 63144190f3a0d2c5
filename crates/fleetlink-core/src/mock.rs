//! In-memory bus for tests.

use crate::bus::{Bus, BusError, BusResult, ConnectTarget, Connection, Headers, RpcParams};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Handler answering a mocked RPC method.
pub type CallHandler = Arc<dyn Fn(&RpcParams) -> BusResult<Value> + Send + Sync>;

/// A call observed by a mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Peer the call was addressed to.
    pub peer: String,
    /// Method name.
    pub method: String,
    /// Parameters as sent.
    pub params: RpcParams,
}

/// A publish observed by a mock.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    /// Topic.
    pub topic: String,
    /// Headers.
    pub headers: Headers,
    /// Message body.
    pub message: Value,
}

fn method_not_found(method: &str) -> BusError {
    BusError::Remote {
        code: -32601,
        message: format!("method not found: {method}"),
    }
}

/// The remote end of mock connections: the console's methods and what it
/// received.
#[derive(Default)]
pub struct MockRemote {
    handlers: Mutex<HashMap<String, CallHandler>>,
    calls: Mutex<Vec<RecordedCall>>,
    published: Mutex<Vec<Published>>,
    unreachable: AtomicBool,
}

impl MockRemote {
    /// Answer `method` with `handler`.
    pub fn on_call<F>(&self, method: &str, handler: F)
    where
        F: Fn(&RpcParams) -> BusResult<Value> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .insert(method.to_string(), Arc::new(handler));
    }

    /// Make the remote peer stop (or resume) answering.
    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Whether the remote peer answers.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        !self.unreachable.load(Ordering::SeqCst)
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Calls received for one method.
    #[must_use]
    pub fn calls_to(&self, method: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Messages published to the remote bus so far.
    #[must_use]
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().clone()
    }

    fn dispatch(&self, peer: &str, method: &str, params: RpcParams) -> BusResult<Value> {
        let handler = self.handlers.lock().get(method).cloned();
        self.calls.lock().push(RecordedCall {
            peer: peer.to_string(),
            method: method.to_string(),
            params: params.clone(),
        });
        handler.map_or_else(|| Err(method_not_found(method)), |h| h(&params))
    }
}

/// A session handed out by [`MockBus`].
pub struct MockConnection {
    peer: String,
    address: Option<String>,
    remote: Arc<MockRemote>,
    killed: AtomicBool,
}

impl MockConnection {
    /// Whether `kill` has been called on this session.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn peer(&self) -> &str {
        &self.peer
    }

    fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    async fn is_connected(&self, _timeout: Duration) -> bool {
        !self.is_killed()
    }

    async fn is_peer_connected(&self, _timeout: Duration) -> bool {
        !self.is_killed() && self.remote.is_reachable()
    }

    async fn call(&self, method: &str, params: RpcParams, _timeout: Duration) -> BusResult<Value> {
        if self.is_killed() {
            return Err(BusError::Disconnected);
        }
        if !self.remote.is_reachable() {
            return Err(BusError::Unreachable(self.peer.clone()));
        }
        self.remote.dispatch(&self.peer, method, params)
    }

    async fn publish(&self, topic: &str, headers: &Headers, message: &Value) -> BusResult<()> {
        if self.is_killed() {
            return Err(BusError::Disconnected);
        }
        self.remote.published.lock().push(Published {
            topic: topic.to_string(),
            headers: headers.clone(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }
}

/// A mock local bus that keeps peers, handlers and traffic in memory.
///
/// Sessions opened with [`Bus::connect`] or [`Bus::connect_local`] all talk
/// to the same [`MockRemote`], available through [`MockBus::console`].
pub struct MockBus {
    identity: String,
    public_key: String,
    peers: Mutex<Vec<String>>,
    handlers: Mutex<HashMap<(String, String), CallHandler>>,
    calls: Mutex<Vec<RecordedCall>>,
    published: Mutex<Vec<Published>>,
    facts: Mutex<HashMap<String, Value>>,
    console: Arc<MockRemote>,
    connects: Mutex<Vec<Option<ConnectTarget>>>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
    refuse_connect: AtomicBool,
    fail_queries: AtomicBool,
}

impl MockBus {
    /// Create a mock bus for an agent with the given identity and key.
    #[must_use]
    pub fn new(identity: &str, public_key: &str) -> Self {
        Self {
            identity: identity.to_string(),
            public_key: public_key.to_string(),
            peers: Mutex::new(Vec::new()),
            handlers: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            facts: Mutex::new(HashMap::new()),
            console: Arc::new(MockRemote::default()),
            connects: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
            refuse_connect: AtomicBool::new(false),
            fail_queries: AtomicBool::new(false),
        }
    }

    /// Add a peer to the local peer list.
    pub fn add_peer(&self, peer: &str) {
        let mut peers = self.peers.lock();
        if !peers.iter().any(|p| p == peer) {
            peers.push(peer.to_string());
        }
    }

    /// Remove a peer from the local peer list.
    pub fn remove_peer(&self, peer: &str) {
        self.peers.lock().retain(|p| p != peer);
    }

    /// Answer `peer.method` with `handler`, adding `peer` to the peer list.
    pub fn on_call<F>(&self, peer: &str, method: &str, handler: F)
    where
        F: Fn(&RpcParams) -> BusResult<Value> + Send + Sync + 'static,
    {
        self.add_peer(peer);
        self.handlers
            .lock()
            .insert((peer.to_string(), method.to_string()), Arc::new(handler));
    }

    /// Set the value returned by `query(key)`.
    pub fn set_fact(&self, key: &str, value: Value) {
        self.facts.lock().insert(key.to_string(), value);
    }

    /// Make `connect` fail with `Unreachable`.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// Make `query` fail with `Unreachable`, as when the router is not up.
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// The remote end shared by every session this bus opens.
    #[must_use]
    pub fn console(&self) -> Arc<MockRemote> {
        Arc::clone(&self.console)
    }

    /// Local calls made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Local calls made to `peer.method`.
    #[must_use]
    pub fn calls_to(&self, peer: &str, method: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.peer == peer && c.method == method)
            .cloned()
            .collect()
    }

    /// Local publishes made so far.
    #[must_use]
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().clone()
    }

    /// Number of sessions opened, remote and local.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }

    /// Targets of the sessions opened; `None` marks a local session.
    #[must_use]
    pub fn connect_targets(&self) -> Vec<Option<ConnectTarget>> {
        self.connects.lock().clone()
    }

    /// Sessions opened so far, oldest first.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.connections.lock().clone()
    }

    fn open(&self, peer: &str, target: Option<&ConnectTarget>) -> Arc<MockConnection> {
        let conn = Arc::new(MockConnection {
            peer: peer.to_string(),
            address: target.map(|t| t.address.clone()),
            remote: Arc::clone(&self.console),
            killed: AtomicBool::new(false),
        });
        self.connects.lock().push(target.cloned());
        self.connections.lock().push(Arc::clone(&conn));
        conn
    }
}

#[async_trait]
impl Bus for MockBus {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn public_key(&self) -> String {
        self.public_key.clone()
    }

    async fn peers(&self, _timeout: Duration) -> BusResult<Vec<String>> {
        Ok(self.peers.lock().clone())
    }

    async fn call(
        &self,
        peer: &str,
        method: &str,
        params: RpcParams,
        _timeout: Duration,
    ) -> BusResult<Value> {
        if !self.peers.lock().iter().any(|p| p == peer) {
            return Err(BusError::Unreachable(peer.to_string()));
        }
        let handler = self
            .handlers
            .lock()
            .get(&(peer.to_string(), method.to_string()))
            .cloned();
        self.calls.lock().push(RecordedCall {
            peer: peer.to_string(),
            method: method.to_string(),
            params: params.clone(),
        });
        handler.map_or_else(|| Err(method_not_found(method)), |h| h(&params))
    }

    async fn publish(&self, topic: &str, headers: &Headers, message: &Value) -> BusResult<()> {
        self.published.lock().push(Published {
            topic: topic.to_string(),
            headers: headers.clone(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn query(&self, key: &str, _timeout: Duration) -> BusResult<Value> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(BusError::Unreachable("router".to_string()));
        }
        Ok(self.facts.lock().get(key).cloned().unwrap_or(Value::Null))
    }

    async fn connect(&self, target: &ConnectTarget) -> BusResult<Arc<dyn Connection>> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(BusError::Unreachable(target.address.clone()));
        }
        let conn: Arc<dyn Connection> = self.open(&target.peer, Some(target));
        Ok(conn)
    }

    async fn connect_local(&self, peer: &str) -> BusResult<Arc<dyn Connection>> {
        if !self.peers.lock().iter().any(|p| p == peer) {
            return Err(BusError::Unreachable(peer.to_string()));
        }
        let conn: Arc<dyn Connection> = self.open(peer, None);
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn unknown_peer_is_unreachable() {
        let bus = MockBus::new("platform.agent", "key");
        let err = bus
            .call("control", "list_agents", RpcParams::None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Unreachable(_)));
    }

    #[tokio::test]
    async fn handler_answers_and_call_is_recorded() {
        let bus = MockBus::new("platform.agent", "key");
        bus.on_call("control", "list_agents", |_| Ok(json!([])));
        let out = bus
            .call("control", "list_agents", RpcParams::None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(out, json!([]));
        assert_eq!(bus.calls_to("control", "list_agents").len(), 1);
    }

    #[tokio::test]
    async fn killed_connection_refuses_calls() {
        let bus = MockBus::new("platform.agent", "key");
        let target = ConnectTarget {
            address: "tcp://127.0.0.1:22916".into(),
            serverkey: "sk".into(),
            peer: "volttron.central".into(),
            identity: "bldg-1".into(),
        };
        let conn = bus.connect(&target).await.unwrap();
        assert!(conn.is_peer_connected(Duration::from_secs(1)).await);
        conn.kill().await;
        assert!(!conn.is_connected(Duration::from_secs(1)).await);
        let err = conn
            .call("get_publickey", RpcParams::None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Disconnected));
    }
}
