//! BACnet device discovery through a proxy agent.
//!
//! A scan asks the proxy to broadcast `who_is` and, for `scan_length`
//! seconds, forwards every I-Am answer to the console enriched with the
//! device's name and description. Property dumps for one device are read
//! in the background and published to the console when done.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fleetlink_core::{Bus, RpcParams};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{ControlError, Result};
use crate::sink::ConsoleSink;

/// Topic the proxies publish I-Am answers on.
pub const IAM_TOPIC: &str = "protocols/bacnet/i_am";

/// Timeout for the peer check and `who_is`.
pub const PROXY_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for one `read_property` call.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Device properties read when no filter is given.
pub const DEFAULT_DEVICE_PROPERTIES: [&str; 6] = [
    "object_name",
    "description",
    "vendor_name",
    "model_name",
    "firmware_revision",
    "application_software_version",
];

const fn default_scan_length() -> u64 {
    5
}

/// Parameters of `start_bacnet_scan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Identity of the BACnet proxy agent.
    pub proxy_identity: String,
    /// Lowest device instance to ask for.
    #[serde(default)]
    pub low_device_id: Option<i64>,
    /// Highest device instance to ask for.
    #[serde(default)]
    pub high_device_id: Option<i64>,
    /// Address to direct the `who_is` at instead of broadcasting.
    #[serde(default)]
    pub target_address: Option<String>,
    /// Seconds to forward I-Am answers for.
    #[serde(default = "default_scan_length")]
    pub scan_length: u64,
}

/// Parameters of `publish_bacnet_props`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropsRequest {
    /// Identity of the BACnet proxy agent.
    pub proxy_identity: String,
    /// BACnet address of the device.
    pub address: String,
    /// Device instance number.
    pub device_id: i64,
    /// Properties to read; empty reads the defaults.
    #[serde(default)]
    pub filter: Vec<String>,
}

/// Parse request parameters, accepting named parameters only.
///
/// # Errors
///
/// Returns `ControlError::InvalidParams` if required fields are missing.
pub fn parse_request<T: for<'de> Deserialize<'de>>(params: &RpcParams) -> Result<T> {
    match params {
        RpcParams::Named(map) => serde_json::from_value(Value::Object(map.clone()))
            .map_err(|e| ControlError::InvalidParams(e.to_string())),
        _ => Err(ControlError::InvalidParams(
            "expected named parameters".to_string(),
        )),
    }
}

/// Reads BACnet properties of a device.
#[async_trait]
pub trait PropertyReader: Send + Sync {
    /// Read `properties` of the device object `device_id` at `address`
    /// through `proxy`. Properties that fail to read are omitted.
    async fn read_properties(
        &self,
        proxy: &str,
        address: &str,
        device_id: i64,
        properties: &[String],
    ) -> Result<Map<String, Value>>;
}

/// Property reader calling `read_property` on the proxy agent.
pub struct ProxyPropertyReader {
    bus: Arc<dyn Bus>,
}

impl ProxyPropertyReader {
    /// Create a reader over the local bus.
    #[must_use]
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl PropertyReader for ProxyPropertyReader {
    async fn read_properties(
        &self,
        proxy: &str,
        address: &str,
        device_id: i64,
        properties: &[String],
    ) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        for property in properties {
            let params = RpcParams::named([
                ("target_address", Value::from(address)),
                ("object_type", Value::from("device")),
                ("instance_number", Value::from(device_id)),
                ("property_name", Value::from(property.as_str())),
            ]);
            match self
                .bus
                .call(proxy, "read_property", params, READ_TIMEOUT)
                .await
            {
                Ok(value) => {
                    out.insert(property.clone(), value);
                }
                Err(e) if e.is_retriable() => return Err(e.into()),
                Err(e) => {
                    tracing::debug!(device_id, property = %property, error = %e, "Property read failed");
                }
            }
        }
        Ok(out)
    }
}

/// Property reader answering from a fixed table.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MockPropertyReader {
    /// Values returned for every device.
    pub values: Mutex<Map<String, Value>>,
    /// Requests seen, as `(proxy, address, device_id)`.
    pub requests: Mutex<Vec<(String, String, i64)>>,
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl PropertyReader for MockPropertyReader {
    async fn read_properties(
        &self,
        proxy: &str,
        address: &str,
        device_id: i64,
        properties: &[String],
    ) -> Result<Map<String, Value>> {
        self.requests
            .lock()
            .push((proxy.to_string(), address.to_string(), device_id));
        let values = self.values.lock();
        Ok(properties
            .iter()
            .filter_map(|p| values.get(p).map(|v| (p.clone(), v.clone())))
            .collect())
    }
}

/// Completion of a scan's stop task.
#[derive(Debug)]
pub struct ScanHandle {
    done: oneshot::Receiver<()>,
}

impl ScanHandle {
    /// Wait for the scan to end. Returns false if a newer scan cancelled it.
    pub async fn finished(self) -> bool {
        self.done.await.is_ok()
    }
}

fn status_message(status: &str) -> Value {
    json!({"status": status, "timestamp": Utc::now().to_rfc3339()})
}

/// Runs BACnet scans and property reads.
pub struct ScanController {
    bus: Arc<dyn Bus>,
    reader: Arc<dyn PropertyReader>,
    sink: Arc<ConsoleSink>,
    publishing_iam: Arc<AtomicBool>,
    stop_task: Mutex<Option<JoinHandle<()>>>,
}

impl ScanController {
    /// Create a controller.
    #[must_use]
    pub fn new(bus: Arc<dyn Bus>, reader: Arc<dyn PropertyReader>, sink: Arc<ConsoleSink>) -> Self {
        Self {
            bus,
            reader,
            sink,
            publishing_iam: Arc::new(AtomicBool::new(false)),
            stop_task: Mutex::new(None),
        }
    }

    /// Whether I-Am answers are currently forwarded.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.publishing_iam.load(Ordering::SeqCst)
    }

    /// Start a scan. A scan already running has its stop task replaced.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Unreachable` if the proxy is not on the bus and
    /// any error from the `who_is` call.
    pub async fn start(&self, request: ScanRequest) -> Result<ScanHandle> {
        let peers = self.bus.peers(PROXY_TIMEOUT).await?;
        if !peers.iter().any(|p| *p == request.proxy_identity) {
            return Err(ControlError::Unreachable(request.proxy_identity));
        }

        let params = RpcParams::named([
            ("low_device_id", json!(request.low_device_id)),
            ("high_device_id", json!(request.high_device_id)),
            ("target_address", json!(request.target_address)),
        ]);
        self.bus
            .call(&request.proxy_identity, "who_is", params, PROXY_TIMEOUT)
            .await?;

        self.publishing_iam.store(true, Ordering::SeqCst);
        self.sink.publish("iam", &status_message("STARTED IAM")).await;
        tracing::info!(
            proxy = %request.proxy_identity,
            scan_length = request.scan_length,
            "Started BACnet scan"
        );

        let (tx, rx) = oneshot::channel();
        let flag = Arc::clone(&self.publishing_iam);
        let sink = Arc::clone(&self.sink);
        let length = Duration::from_secs(request.scan_length);
        let task = tokio::spawn(async move {
            tokio::time::sleep(length).await;
            sink.publish("iam", &status_message("FINISHED IAM")).await;
            flag.store(false, Ordering::SeqCst);
            tracing::info!("Finished BACnet scan");
            let _ = tx.send(());
        });

        if let Some(previous) = self.stop_task.lock().replace(task) {
            previous.abort();
        }

        Ok(ScanHandle { done: rx })
    }

    /// Handle an I-Am answer published by `sender`. Ignored unless a scan is
    /// running.
    pub async fn on_iam(&self, sender: &str, message: &Value) {
        if !self.is_scanning() {
            return;
        }
        let Some(mut iam) = message.as_object().cloned() else {
            tracing::warn!(sender = %sender, "Ignoring malformed I-Am message");
            return;
        };
        let address = iam.get("address").and_then(Value::as_str).map(str::to_string);
        let device_id = iam.get("device_id").and_then(Value::as_i64);

        let (name, description) = match (address, device_id) {
            (Some(address), Some(device_id)) => {
                let wanted = ["object_name".to_string(), "description".to_string()];
                match self
                    .reader
                    .read_properties(sender, &address, device_id, &wanted)
                    .await
                {
                    Ok(mut props) => (
                        props.remove("object_name").unwrap_or(Value::Null),
                        props.remove("description").unwrap_or(Value::Null),
                    ),
                    Err(e) => {
                        tracing::warn!(device_id, error = %e, "Could not read device name");
                        (Value::Null, Value::Null)
                    }
                }
            }
            _ => (Value::Null, Value::Null),
        };

        iam.insert("device_name".to_string(), name);
        iam.insert("device_description".to_string(), description);
        self.sink.publish("iam", &Value::Object(iam)).await;
    }

    /// Read a device's properties in the background and publish them to the
    /// console's `configure` topic. Returns the `PUBLISHING` marker.
    pub fn publish_props(&self, request: PropsRequest) -> (Value, JoinHandle<()>) {
        let reader = Arc::clone(&self.reader);
        let sink = Arc::clone(&self.sink);

        let task = tokio::spawn(async move {
            let properties: Vec<String> = if request.filter.is_empty() {
                DEFAULT_DEVICE_PROPERTIES
                    .iter()
                    .map(|p| (*p).to_string())
                    .collect()
            } else {
                request.filter.clone()
            };

            let mut message = match serde_json::to_value(&request) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            };
            match reader
                .read_properties(
                    &request.proxy_identity,
                    &request.address,
                    request.device_id,
                    &properties,
                )
                .await
            {
                Ok(results) => {
                    message.insert("results".to_string(), Value::Object(results));
                }
                Err(e) => {
                    tracing::error!(device_id = request.device_id, error = %e, "Property read failed");
                    message.insert("results".to_string(), Value::Null);
                    message.insert("error".to_string(), Value::from(e.to_string()));
                }
            }
            sink.publish("configure", &Value::Object(message)).await;
        });

        (Value::from("PUBLISHING"), task)
    }

    /// Cancel a pending scan stop.
    pub fn shutdown(&self) {
        if let Some(task) = self.stop_task.lock().take() {
            task.abort();
        }
        self.publishing_iam.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionManager;
    use fleetlink_core::mock::MockBus;
    use fleetlink_core::{identities, ConnectTarget, InstanceId};

    const PROXY: &str = "platform.bacnet_proxy";

    async fn setup() -> (Arc<MockBus>, Arc<MockPropertyReader>, ScanController) {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        bus.on_call(PROXY, "who_is", |_| Ok(Value::Null));

        let connections = Arc::new(ConnectionManager::new(bus.clone()));
        connections
            .get(Some(ConnectTarget {
                address: "tcp://10.0.0.1:22916".into(),
                serverkey: "vc-sk".into(),
                peer: identities::CONSOLE.into(),
                identity: "bldg-1".into(),
            }))
            .await
            .unwrap();
        let sink = Arc::new(ConsoleSink::new(connections));
        sink.set_instance_id(Some(InstanceId::from_address("tcp://10.0.0.5:22916")));

        let reader = Arc::new(MockPropertyReader::default());
        reader
            .values
            .lock()
            .insert("object_name".into(), json!("AHU-1"));
        reader
            .values
            .lock()
            .insert("description".into(), json!("Air handler"));

        let controller = ScanController::new(bus.clone(), reader.clone(), sink);
        (bus, reader, controller)
    }

    fn request(scan_length: u64) -> ScanRequest {
        ScanRequest {
            proxy_identity: PROXY.into(),
            low_device_id: Some(1),
            high_device_id: Some(100),
            target_address: None,
            scan_length,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scan_starts_and_finishes() {
        let (bus, _, controller) = setup().await;

        let handle = controller.start(request(5)).await.unwrap();
        assert!(controller.is_scanning());

        let who_is = bus.calls_to(PROXY, "who_is");
        assert_eq!(who_is.len(), 1);
        let RpcParams::Named(params) = &who_is[0].params else {
            panic!("expected named params");
        };
        assert_eq!(params["low_device_id"], json!(1));

        assert!(handle.finished().await);
        assert!(!controller.is_scanning());

        let statuses: Vec<Value> = bus
            .console()
            .published()
            .into_iter()
            .map(|p| p.message["status"].clone())
            .collect();
        assert_eq!(statuses, vec![json!("STARTED IAM"), json!("FINISHED IAM")]);
    }

    #[tokio::test(start_paused = true)]
    async fn new_scan_cancels_previous_stop() {
        let (_, _, controller) = setup().await;

        let first = controller.start(request(5)).await.unwrap();
        let second = controller.start(request(5)).await.unwrap();
        assert!(!first.finished().await);
        assert!(second.finished().await);
    }

    #[tokio::test]
    async fn missing_proxy_is_unreachable() {
        let (bus, _, controller) = setup().await;
        bus.remove_peer(PROXY);
        let err = controller.start(request(5)).await.unwrap_err();
        assert!(matches!(err, ControlError::Unreachable(_)));
        assert!(!controller.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn iam_is_enriched_while_scanning() {
        let (bus, reader, controller) = setup().await;
        let iam = json!({"address": "10.0.0.9", "device_id": 500});

        controller.on_iam(PROXY, &iam).await;
        assert!(bus.console().published().is_empty());

        let _handle = controller.start(request(5)).await.unwrap();
        controller.on_iam(PROXY, &iam).await;

        let published = bus.console().published();
        let last = &published.last().unwrap().message;
        assert_eq!(last["device_name"], "AHU-1");
        assert_eq!(last["device_description"], "Air handler");
        assert_eq!(last["device_id"], 500);
        assert_eq!(reader.requests.lock()[0].0, PROXY);
    }

    #[tokio::test]
    async fn props_are_published_to_configure() {
        let (bus, _, controller) = setup().await;

        let (reply, task) = controller.publish_props(PropsRequest {
            proxy_identity: PROXY.into(),
            address: "10.0.0.9".into(),
            device_id: 500,
            filter: vec!["object_name".into()],
        });
        assert_eq!(reply, json!("PUBLISHING"));
        task.await.unwrap();

        let published = bus.console().published();
        assert!(published[0].topic.ends_with("/configure"));
        assert_eq!(published[0].message["results"]["object_name"], "AHU-1");
        assert_eq!(published[0].message["device_id"], 500);
    }

    #[tokio::test]
    async fn proxy_reader_calls_read_property() {
        let bus = Arc::new(MockBus::new(identities::PLATFORM, "pk"));
        bus.on_call(PROXY, "read_property", |params| match params {
            RpcParams::Named(map) if map["property_name"] == json!("object_name") => {
                Ok(json!("AHU-1"))
            }
            _ => Err(fleetlink_core::BusError::Remote {
                code: -32000,
                message: "unknown property".into(),
            }),
        });

        let reader = ProxyPropertyReader::new(bus.clone());
        let props = reader
            .read_properties(
                PROXY,
                "10.0.0.9",
                500,
                &["object_name".into(), "bogus".into()],
            )
            .await
            .unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props["object_name"], "AHU-1");
    }

    #[test]
    fn parse_scan_request_defaults() {
        let params = RpcParams::named([("proxy_identity", json!(PROXY))]);
        let request: ScanRequest = parse_request(&params).unwrap();
        assert_eq!(request.scan_length, 5);
        assert!(parse_request::<ScanRequest>(&RpcParams::None).is_err());
    }
}
