//! HTTP client for the local router bridge.
//!
//! The router bridge owns the native bus sockets. `HttpBus` implements the
//! [`Bus`] contract by calling the bridge's REST API, and `HttpConnection`
//! does the same for sessions the bridge holds open to remote peers.
//!
//! # Bridge API
//!
//! ```text
//! GET    /v1/peers                      -> ["control", ...]
//! GET    /v1/query/{key}                -> {"value": ...}
//! POST   /v1/call                       {peer, method, params, timeout_ms}
//! POST   /v1/publish                    {topic, headers, message}
//! POST   /v1/connections                {address?, serverkey?, peer, identity?} -> {"id": ...}
//! GET    /v1/connections/{id}           -> {"connected": bool, "peer_connected": bool}
//! POST   /v1/connections/{id}/call      {method, params, timeout_ms}
//! POST   /v1/connections/{id}/publish   {topic, headers, message}
//! DELETE /v1/connections/{id}
//! ```
//!
//! Calls answer `{"result": ...}` or `{"error": {"code", "message"}}`. A
//! `404` means the peer is not on the bus and a `504` that it did not answer
//! in time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fleetlink_core::{Bus, BusError, BusResult, ConnectTarget, Connection, Headers, RpcParams};

/// Timeout for bridge requests that carry no timeout of their own.
const BRIDGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Extra time allowed on top of a call's own timeout for the bridge hop.
const BRIDGE_SLACK: Duration = Duration::from_secs(2);

/// Request body for a call.
#[derive(Debug, Serialize)]
struct CallRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    peer: Option<&'a str>,
    method: &'a str,
    params: Value,
    timeout_ms: u128,
}

/// Request body for a publish.
#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    topic: &'a str,
    headers: &'a Headers,
    message: &'a Value,
}

/// Request body for opening a session.
#[derive(Debug, Serialize)]
struct ConnectRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    serverkey: Option<&'a str>,
    peer: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<&'a str>,
}

/// Error body of a failed call.
#[derive(Debug, Deserialize)]
struct RemoteError {
    code: i64,
    message: String,
}

/// Response body of a call.
#[derive(Debug, Deserialize)]
struct CallResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RemoteError>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SessionStatus {
    #[serde(default)]
    connected: bool,
    #[serde(default)]
    peer_connected: bool,
}

/// Map a transport failure onto the bus error taxonomy.
fn transport_error(op: &str, err: &reqwest::Error) -> BusError {
    if err.is_timeout() {
        BusError::Timeout(op.to_string())
    } else if err.is_connect() {
        BusError::Unreachable("router bridge".to_string())
    } else {
        BusError::Transport(format!("{op}: {err}"))
    }
}

/// Check the status of a bridge response, mapping failures.
async fn check(op: &str, peer: &str, response: reqwest::Response) -> BusResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        reqwest::StatusCode::NOT_FOUND => Err(BusError::Unreachable(peer.to_string())),
        reqwest::StatusCode::GATEWAY_TIMEOUT => Err(BusError::Timeout(op.to_string())),
        reqwest::StatusCode::GONE => Err(BusError::Disconnected),
        _ => {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(op = %op, status = %status, body = %body, "Bridge request failed");
            Err(BusError::Transport(format!(
                "{op}: bridge returned status {status}"
            )))
        }
    }
}

/// Decode a call response into a result or a remote error.
async fn call_result(op: &str, response: reqwest::Response) -> BusResult<Value> {
    let body: CallResponse = response
        .json()
        .await
        .map_err(|e| BusError::Transport(format!("{op}: invalid response: {e}")))?;
    match body.error {
        Some(err) => Err(BusError::Remote {
            code: err.code,
            message: err.message,
        }),
        None => Ok(body.result),
    }
}

fn timeout_ms(timeout: Duration) -> u128 {
    timeout.as_millis()
}

/// [`Bus`] implementation over the router bridge's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpBus {
    client: reqwest::Client,
    base_url: String,
    identity: String,
    public_key: String,
}

impl HttpBus {
    /// Create a bridge client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the router bridge (e.g., "http://127.0.0.1:8081")
    /// * `identity` - This agent's identity on the bus
    /// * `public_key` - This agent's public key
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        identity: impl Into<String>,
        public_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to create HTTP client");

        Self::with_client(client, base_url, identity, public_key)
    }

    /// Create a bridge client with a custom reqwest client.
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        identity: impl Into<String>,
        public_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identity: identity.into(),
            public_key: public_key.into(),
        }
    }

    /// Get the base URL of the router bridge.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn open(&self, request: &ConnectRequest<'_>) -> BusResult<Arc<dyn Connection>> {
        let url = format!("{}/v1/connections", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .timeout(BRIDGE_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error("connect", &e))?;
        let response = check("connect", request.peer, response).await?;
        let body: ConnectResponse = response
            .json()
            .await
            .map_err(|e| BusError::Transport(format!("connect: invalid response: {e}")))?;

        tracing::debug!(
            peer = %request.peer,
            address = ?request.address,
            session = %body.id,
            "Opened bridge session"
        );
        Ok(Arc::new(HttpConnection {
            client: self.client.clone(),
            url: format!("{}/v1/connections/{}", self.base_url, body.id),
            peer: request.peer.to_string(),
            address: request.address.map(str::to_string),
        }))
    }
}

#[async_trait]
impl Bus for HttpBus {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn public_key(&self) -> String {
        self.public_key.clone()
    }

    async fn peers(&self, timeout: Duration) -> BusResult<Vec<String>> {
        let url = format!("{}/v1/peers", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error("peers", &e))?;
        check("peers", "router", response)
            .await?
            .json()
            .await
            .map_err(|e| BusError::Transport(format!("peers: invalid response: {e}")))
    }

    async fn call(
        &self,
        peer: &str,
        method: &str,
        params: RpcParams,
        timeout: Duration,
    ) -> BusResult<Value> {
        let url = format!("{}/v1/call", self.base_url);
        let request = CallRequest {
            peer: Some(peer),
            method,
            params: params.to_value(),
            timeout_ms: timeout_ms(timeout),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(timeout + BRIDGE_SLACK)
            .send()
            .await
            .map_err(|e| transport_error(method, &e))?;
        let response = check(method, peer, response).await?;
        call_result(method, response).await
    }

    async fn publish(&self, topic: &str, headers: &Headers, message: &Value) -> BusResult<()> {
        let url = format!("{}/v1/publish", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&PublishRequest {
                topic,
                headers,
                message,
            })
            .timeout(BRIDGE_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error("publish", &e))?;
        check("publish", "router", response).await?;
        Ok(())
    }

    async fn query(&self, key: &str, timeout: Duration) -> BusResult<Value> {
        let url = format!("{}/v1/query/{key}", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error("query", &e))?;
        let body: QueryResponse = check("query", "router", response)
            .await?
            .json()
            .await
            .map_err(|e| BusError::Transport(format!("query: invalid response: {e}")))?;
        Ok(body.value)
    }

    async fn connect(&self, target: &ConnectTarget) -> BusResult<Arc<dyn Connection>> {
        self.open(&ConnectRequest {
            address: Some(&target.address),
            serverkey: Some(&target.serverkey),
            peer: &target.peer,
            identity: Some(&target.identity),
        })
        .await
    }

    async fn connect_local(&self, peer: &str) -> BusResult<Arc<dyn Connection>> {
        self.open(&ConnectRequest {
            address: None,
            serverkey: None,
            peer,
            identity: None,
        })
        .await
    }
}

/// A session the bridge holds open to one peer.
#[derive(Debug)]
pub struct HttpConnection {
    client: reqwest::Client,
    url: String,
    peer: String,
    address: Option<String>,
}

impl HttpConnection {
    async fn status(&self, timeout: Duration) -> Option<SessionStatus> {
        let response = self.client.get(&self.url).timeout(timeout).send().await;
        match response {
            Ok(r) if r.status().is_success() => r.json().await.ok(),
            Ok(r) => {
                tracing::debug!(peer = %self.peer, status = %r.status(), "Session status unavailable");
                None
            }
            Err(e) => {
                tracing::debug!(peer = %self.peer, error = %e, "Session status request failed");
                None
            }
        }
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn peer(&self) -> &str {
        &self.peer
    }

    fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    async fn is_connected(&self, timeout: Duration) -> bool {
        self.status(timeout).await.is_some_and(|s| s.connected)
    }

    async fn is_peer_connected(&self, timeout: Duration) -> bool {
        self.status(timeout)
            .await
            .is_some_and(|s| s.connected && s.peer_connected)
    }

    async fn call(&self, method: &str, params: RpcParams, timeout: Duration) -> BusResult<Value> {
        let request = CallRequest {
            peer: None,
            method,
            params: params.to_value(),
            timeout_ms: timeout_ms(timeout),
        };
        let response = self
            .client
            .post(format!("{}/call", self.url))
            .json(&request)
            .timeout(timeout + BRIDGE_SLACK)
            .send()
            .await
            .map_err(|e| transport_error(method, &e))?;
        let response = check(method, &self.peer, response).await?;
        call_result(method, response).await
    }

    async fn publish(&self, topic: &str, headers: &Headers, message: &Value) -> BusResult<()> {
        let response = self
            .client
            .post(format!("{}/publish", self.url))
            .json(&PublishRequest {
                topic,
                headers,
                message,
            })
            .timeout(BRIDGE_TIMEOUT)
            .send()
            .await
            .map_err(|e| transport_error("publish", &e))?;
        check("publish", &self.peer, response).await?;
        Ok(())
    }

    async fn kill(&self) {
        let result = self
            .client
            .delete(&self.url)
            .timeout(BRIDGE_TIMEOUT)
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!(peer = %self.peer, error = %e, "Failed to close bridge session");
        }
    }
}
