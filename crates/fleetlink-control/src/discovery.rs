//! Console address discovery.
//!
//! Console addresses come in two forms. Native bus addresses (`tcp://`,
//! `ipc://`) are used as given together with the configured server key.
//! Web addresses (`http://`, `https://`) are translated into a native address
//! and key by asking the console's discovery endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Scheme of a console address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressScheme {
    /// `http://`
    Http,
    /// `https://`
    Https,
    /// `tcp://`
    Tcp,
    /// `ipc://`
    Ipc,
}

impl AddressScheme {
    /// Classify an address by its scheme.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidAddress` if the address has no scheme or
    /// an unsupported one.
    pub fn classify(address: &str) -> Result<Self> {
        let (scheme, rest) = address
            .split_once("://")
            .ok_or_else(|| ControlError::InvalidAddress(address.to_string()))?;
        if rest.is_empty() {
            return Err(ControlError::InvalidAddress(address.to_string()));
        }
        match scheme.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "tcp" => Ok(Self::Tcp),
            "ipc" => Ok(Self::Ipc),
            _ => Err(ControlError::InvalidAddress(address.to_string())),
        }
    }

    /// Whether the address must go through discovery.
    #[must_use]
    pub const fn needs_discovery(self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }
}

/// Body returned by the console's discovery endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryInfo {
    /// Server key of the console's bus.
    pub serverkey: String,
    /// Native bus address of the console.
    #[serde(rename = "vip-address")]
    pub vip_address: String,
}

/// A resolved console endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConsole {
    /// Native bus address.
    pub address: String,
    /// Server key, if known.
    pub serverkey: Option<String>,
}

/// Trait for console discovery.
///
/// This trait abstracts the discovery request, allowing for mock
/// implementations in tests.
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Ask the console at a web address for its native address and key.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Discovery` if the request fails or the body is
    /// incomplete.
    async fn discover(&self, address: &str) -> Result<DiscoveryInfo>;
}

/// Discovery client speaking HTTP to the console.
#[derive(Debug, Clone)]
pub struct HttpDiscoveryClient {
    client: reqwest::Client,
}

impl Default for HttpDiscoveryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDiscoveryClient {
    /// Create a new discovery client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Create a new discovery client with a custom reqwest client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiscoveryClient for HttpDiscoveryClient {
    async fn discover(&self, address: &str) -> Result<DiscoveryInfo> {
        let url = format!("{}/discovery/", address.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ControlError::Discovery(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, status = %status, "Console discovery rejected");
            return Err(ControlError::Discovery(format!(
                "{url} returned status {status}"
            )));
        }

        let info = response
            .json::<DiscoveryInfo>()
            .await
            .map_err(|e| ControlError::Discovery(format!("invalid discovery body: {e}")))?;

        if info.serverkey.is_empty() || info.vip_address.is_empty() {
            return Err(ControlError::Discovery(
                "discovery body is missing serverkey or vip-address".to_string(),
            ));
        }

        tracing::debug!(url = %url, vip_address = %info.vip_address, "Discovered console");
        Ok(info)
    }
}

/// Resolve a configured console address and key into a native endpoint.
///
/// # Errors
///
/// Returns `ControlError::InvalidAddress` for an unsupported scheme and
/// `ControlError::Discovery` if a web address cannot be resolved.
pub async fn resolve(
    discovery: &dyn DiscoveryClient,
    address: &str,
    serverkey: Option<&str>,
) -> Result<ResolvedConsole> {
    if AddressScheme::classify(address)?.needs_discovery() {
        let info = discovery.discover(address).await?;
        Ok(ResolvedConsole {
            address: info.vip_address,
            serverkey: Some(info.serverkey),
        })
    } else {
        Ok(ResolvedConsole {
            address: address.to_string(),
            serverkey: serverkey.map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn classify_schemes() {
        assert_eq!(
            AddressScheme::classify("http://vc:8080").unwrap(),
            AddressScheme::Http
        );
        assert_eq!(
            AddressScheme::classify("HTTPS://vc").unwrap(),
            AddressScheme::Https
        );
        assert_eq!(
            AddressScheme::classify("tcp://10.0.0.1:22916").unwrap(),
            AddressScheme::Tcp
        );
        assert_eq!(
            AddressScheme::classify("ipc://@/home/vip.socket").unwrap(),
            AddressScheme::Ipc
        );
    }

    #[test]
    fn reject_unknown_schemes() {
        for bad in ["ftp://vc", "vc.example:8080", "tcp://", ""] {
            let err = AddressScheme::classify(bad).unwrap_err();
            assert!(matches!(err, ControlError::InvalidAddress(_)), "{bad}");
        }
    }

    #[tokio::test]
    async fn native_address_passes_through() {
        let client = HttpDiscoveryClient::new();
        let resolved = resolve(&client, "tcp://10.0.0.1:22916", Some("vc-sk"))
            .await
            .unwrap();
        assert_eq!(resolved.address, "tcp://10.0.0.1:22916");
        assert_eq!(resolved.serverkey.as_deref(), Some("vc-sk"));
    }

    #[tokio::test]
    async fn web_address_is_discovered() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discovery/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "serverkey": "vc-sk",
                "vip-address": "tcp://10.0.0.1:22916",
                "instance-name": "central"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpDiscoveryClient::new();
        let resolved = resolve(&client, &server.uri(), None).await.unwrap();
        assert_eq!(resolved.address, "tcp://10.0.0.1:22916");
        assert_eq!(resolved.serverkey.as_deref(), Some("vc-sk"));
    }

    #[tokio::test]
    async fn discovery_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discovery/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = HttpDiscoveryClient::new();
        let err = client.discover(&server.uri()).await.unwrap_err();
        assert!(matches!(err, ControlError::Discovery(_)));
    }

    #[tokio::test]
    async fn discovery_incomplete_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discovery/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "serverkey": "vc-sk"
            })))
            .mount(&server)
            .await;

        let client = HttpDiscoveryClient::new();
        let err = client.discover(&server.uri()).await.unwrap_err();
        assert!(matches!(err, ControlError::Discovery(_)));
    }
}
