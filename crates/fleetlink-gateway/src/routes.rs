//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use fleetlink_control::ManagedPlatform;

use crate::handlers::{configure, health, pubsub, rpc};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// - `GET /health` - Liveness and registration state
/// - `POST /v1/rpc` - JSON-RPC calls addressed to this platform
/// - `POST /v1/pubsub` - Publishes on subscribed topics
/// - `POST /v1/config` - Configuration store events
pub fn create_router<P>(state: GatewayState<P>) -> Router
where
    P: ManagedPlatform + 'static,
{
    // Extract config values before moving state
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health::health::<P>))
        .route("/v1/rpc", post(rpc::rpc::<P>))
        .route("/v1/pubsub", post(pubsub::publish::<P>))
        .route("/v1/config", post(configure::configure::<P>))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{IDENTITY_HEADER, PUBLIC_KEY_HEADER};
    use crate::config::GatewayConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use fleetlink_auth::MockAuthorizer;
    use fleetlink_control::bacnet::MockPropertyReader;
    use fleetlink_control::discovery::HttpDiscoveryClient;
    use fleetlink_control::stats::MockSampler;
    use fleetlink_control::{
        BusControlClient, Collaborators, PlatformConfig, PlatformService,
    };
    use fleetlink_core::mock::MockBus;
    use fleetlink_core::{identities, Bus};
    use fleetlink_store::RocksStore;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const CONSOLE_ADDRESS: &str = "tcp://10.0.0.1:22916";
    const CONSOLE_KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8";

    struct Fixture {
        app: Router,
        _dir: TempDir,
    }

    fn fixture(authorizer: MockAuthorizer) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let mock = Arc::new(MockBus::new(identities::PLATFORM, "platform-pk"));
        mock.set_fact("addresses", json!(["tcp://10.0.0.5:22916"]));
        mock.set_fact("serverkey", json!("local-sk"));
        let bus: Arc<dyn Bus> = mock;

        let parts = Collaborators {
            control: Arc::new(BusControlClient::new(Arc::clone(&bus))),
            discovery: Arc::new(HttpDiscoveryClient::new()),
            reader: Arc::new(MockPropertyReader::default()),
            sampler: Arc::new(MockSampler::busy(5.0)),
        };
        let platform = Arc::new(PlatformService::new(
            bus,
            store,
            Arc::new(authorizer),
            PlatformConfig::default(),
            parts,
        ));

        Fixture {
            app: create_router(GatewayState::new(platform, GatewayConfig::default())),
            _dir: dir,
        }
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header(IDENTITY_HEADER, identities::CONSOLE)
            .header(PUBLIC_KEY_HEADER, CONSOLE_KEY)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn rpc_request(id: i64, method: &str, params: Value) -> Request<Body> {
        post_json(
            "/v1/rpc",
            &json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}),
        )
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn configure_console(app: &Router) {
        let event = json!({
            "name": "default_config",
            "action": "NEW",
            "contents": {
                "volttron-central-address": CONSOLE_ADDRESS,
                "volttron-central-serverkey": "vc-sk"
            }
        });
        let (status, _) = send(app, post_json("/v1/config", &event)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn health_reports_registration() {
        let f = fixture(MockAuthorizer::permissive());
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&f.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["registration"], "NotRegistered");
        assert_eq!(body["platform"]["status"], "UNKNOWN");
    }

    #[tokio::test]
    async fn rpc_requires_caller_identity() {
        let f = fixture(MockAuthorizer::permissive());
        let request = Request::builder()
            .method("POST")
            .uri("/v1/rpc")
            .header("content-type", "application/json")
            .body(Body::from(json!({"id": 1, "method": "get_health"}).to_string()))
            .unwrap();
        let (status, body) = send(&f.app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn rpc_result_envelope() {
        let f = fixture(MockAuthorizer::permissive());
        let (status, body) = send(&f.app, rpc_request(4, "get_health", Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], 4);
        assert_eq!(body["result"]["status"], "UNKNOWN");
    }

    #[tokio::test]
    async fn rpc_unknown_method() {
        let f = fixture(MockAuthorizer::permissive());
        let (_, body) = send(&f.app, rpc_request(5, "frobnicate", Value::Null)).await;
        assert_eq!(body["id"], 5);
        assert_eq!(body["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn rpc_capability_failure() {
        let f = fixture(MockAuthorizer::default());
        let (_, body) = send(&f.app, rpc_request(6, "get_publickey", Value::Null)).await;
        assert_eq!(body["error"]["code"], -32003);
    }

    #[tokio::test]
    async fn configure_then_manage() {
        let f = fixture(MockAuthorizer::permissive());
        configure_console(&f.app).await;

        let (_, body) = send(&f.app, rpc_request(7, "manage", json!([CONSOLE_ADDRESS]))).await;
        assert_eq!(body["result"], "platform-pk");

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (_, health) = send(&f.app, request).await;
        assert_eq!(health["registration"], "Registered");
        assert!(health["instance_id"].is_string());
    }

    #[tokio::test]
    async fn manage_from_other_console_returns_null() {
        let f = fixture(MockAuthorizer::permissive());
        configure_console(&f.app).await;

        let (_, body) = send(
            &f.app,
            rpc_request(8, "manage", json!({"address": "tcp://10.9.9.9:22916"})),
        )
        .await;
        assert_eq!(body["result"], Value::Null);
    }

    #[tokio::test]
    async fn bad_config_is_rejected() {
        let f = fixture(MockAuthorizer::permissive());
        let event = json!({
            "name": "config",
            "action": "NEW",
            "contents": {"volttron-central-address": "ftp://vc"}
        });
        let (status, body) = send(&f.app, post_json("/v1/config", &event)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn device_publish_is_tracked() {
        let f = fixture(MockAuthorizer::permissive());
        configure_console(&f.app).await;

        let publish = json!({
            "sender": "platform.driver",
            "topic": "devices/campus/building1/all",
            "headers": {},
            "message": [{"temp": 72}, {"temp": {"units": "F"}}]
        });
        let (status, _) = send(&f.app, post_json("/v1/pubsub", &publish)).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (_, body) = send(&f.app, rpc_request(9, "get_devices", Value::Null)).await;
        let device = &body["result"]["campus/building1"];
        assert_eq!(device["points"], json!(["temp"]));
        assert_eq!(device["health"]["status"], "GOOD");
    }

    #[tokio::test]
    async fn repeated_device_publish_refreshes_timestamp() {
        let f = fixture(MockAuthorizer::permissive());
        configure_console(&f.app).await;

        let publish = json!({
            "sender": "platform.driver",
            "topic": "devices/campus/building1/all",
            "headers": {},
            "message": {"temp": 72}
        });
        send(&f.app, post_json("/v1/pubsub", &publish)).await;
        let (_, first) = send(&f.app, rpc_request(11, "get_devices", Value::Null)).await;

        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        send(&f.app, post_json("/v1/pubsub", &publish)).await;
        let (_, second) = send(&f.app, rpc_request(12, "get_devices", Value::Null)).await;

        let devices = second["result"].as_object().unwrap();
        assert_eq!(devices.len(), 1);
        let before = &first["result"]["campus/building1"];
        let after = &second["result"]["campus/building1"];
        assert_eq!(after["hash"], before["hash"]);
        assert_ne!(after["last_published_utc"], before["last_published_utc"]);
        assert_eq!(after["health"]["status"], "GOOD");
    }

    #[tokio::test]
    async fn route_request_errors_stay_in_result() {
        let f = fixture(MockAuthorizer::permissive());
        let (_, body) = send(
            &f.app,
            rpc_request(10, "route_request", json!([77, "start_agent", ["a", "b"]])),
        )
        .await;
        assert_eq!(body["id"], 10);
        assert_eq!(body["result"]["id"], 77);
        assert_eq!(body["result"]["error"]["code"], -32602);
    }
}
