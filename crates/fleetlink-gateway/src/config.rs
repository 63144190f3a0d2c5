//! Gateway configuration types.
//!
//! This module defines configuration structures for the HTTP surface and the
//! router bridge client.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "127.0.0.1:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Base URL of the local router bridge.
    #[serde(default = "GatewayConfig::default_bridge_url")]
    pub bridge_url: String,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "127.0.0.1:8080".to_string()
    }

    fn default_bridge_url() -> String {
        "http://127.0.0.1:8081".to_string()
    }

    const fn default_max_body() -> usize {
        // agent packages arrive inline as base64
        64 * 1024 * 1024
    }

    const fn default_request_timeout() -> u64 {
        // longer than the slowest forwarded call (historian, 45s)
        60
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            bridge_url: Self::default_bridge_url(),
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}
