//! Network control endpoint tests
//!
//! Drives the full router (middleware included) with `tower::ServiceExt::oneshot`
//! against the simulated platform.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use ferrous_shared::{CommandResult, VolumeLevel};
use ferrousd::config::{Config, RestartRoute};
use ferrousd::dispatcher::NOTHING_TO_CANCEL;
use ferrousd::network::AdvertisedAddress;
use ferrousd::platform::{PlatformCall, SimulatedPlatform};
use ferrousd::server::{self, AppState};
use ferrousd::CommandDispatcher;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

// ============================================================================
// Helpers
// ============================================================================

struct TestApp {
    platform: Arc<SimulatedPlatform>,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(Config::default())
    }

    fn with_config(config: Config) -> Self {
        let platform = Arc::new(SimulatedPlatform::new());
        let dispatcher = Arc::new(CommandDispatcher::from_config(&config, platform.clone()));
        let address =
            AdvertisedAddress::resolved(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 40)), 7777);
        let state = Arc::new(AppState::new(dispatcher, config, address));
        Self {
            platform,
            router: server::router(state),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn post(&self, uri: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }
}

fn result_of(body: Value) -> CommandResult {
    serde_json::from_value(body).unwrap()
}

// ============================================================================
// Power
// ============================================================================

#[tokio::test]
async fn test_shutdown_is_pre_confirmed_and_unique() {
    let app = TestApp::new();

    let (status, body) = app.post("/api/shutdown").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        result_of(body),
        CommandResult::ok("Shutdown scheduled in 60 seconds")
    );

    let (status, body) = app.post("/api/shutdown").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        result_of(body),
        CommandResult::failure("A shutdown is already scheduled")
    );

    let (status, body) = app.get("/api/shutdown/state").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "scheduled");
    assert!(body["scheduled_at"].is_string());

    let (status, body) = app.post("/api/cancel").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_of(body), CommandResult::ok("Shutdown cancelled"));
    assert_eq!(app.platform.call_count(PlatformCall::Shutdown), 1);
}

#[tokio::test]
async fn test_cancel_with_nothing_pending() {
    let app = TestApp::new();
    let (status, body) = app.post("/api/cancel").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_of(body), CommandResult::ok(NOTHING_TO_CANCEL));
    assert!(app.platform.calls().is_empty());
}

#[tokio::test]
async fn test_restart_route_follows_config() {
    let app = TestApp::new();
    app.post("/api/restart").await;
    assert_eq!(app.platform.calls(), vec![PlatformCall::Restart]);

    let mut config = Config::default();
    config.power.restart_route = RestartRoute::Sleep;
    let app = TestApp::with_config(config);
    let (_, body) = app.post("/api/restart").await;
    assert_eq!(result_of(body).message, "Sleep command executed");
    assert_eq!(app.platform.calls(), vec![PlatformCall::Sleep]);
}

#[tokio::test(start_paused = true)]
async fn test_required_network_confirmation_rejects_on_timeout() {
    let mut config = Config::default();
    config.confirmation.require_for_network = true;
    config.confirmation.timeout_secs = 2;
    let app = TestApp::with_config(config);

    let (status, body) = app.post("/api/shutdown").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_of(body), CommandResult::cancelled_by_user());
    assert!(app.platform.calls().is_empty());
}

#[tokio::test]
async fn test_platform_failure_maps_to_500() {
    let app = TestApp::new();
    app.platform
        .fail(PlatformCall::Sleep, "Failed to execute sleep: not permitted");

    let (status, body) = app.post("/api/sleep").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        result_of(body),
        CommandResult::failure("Failed to execute sleep: not permitted")
    );
}

// ============================================================================
// Volume
// ============================================================================

#[tokio::test]
async fn test_volume_routes() {
    let app = TestApp::new();

    let (status, body) = app.post("/api/volume/increase").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_of(body).message, "Volume increased to 52%");

    let (_, body) = app.post_json("/api/volume/down", json!({"amount": 12})).await;
    assert_eq!(result_of(body).message, "Volume decreased to 40%");

    let (status, body) = app.get("/api/volume").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"volume": 40, "repoll_after_ms": 300}));

    let (_, body) = app.post_json("/api/volume/set", json!({"volume": 150})).await;
    assert_eq!(result_of(body).message, "Volume set to 100%");
    assert_eq!(app.platform.volume(), VolumeLevel::new(100));

    let (status, body) = app.get("/api/volume/get").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["volume"], 100);
}

#[tokio::test]
async fn test_malformed_volume_body_is_400() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/volume/set")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"volume\": \"loud\"}"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!result_of(body).success);
    assert!(app.platform.calls().is_empty());
}

// ============================================================================
// State and Page
// ============================================================================

#[tokio::test]
async fn test_status_reflects_last_network_command() {
    let app = TestApp::new();
    let (_, body) = app.get("/api/status").await;
    assert_eq!(body, Value::Null);

    app.post("/api/volume/up").await;
    let (status, body) = app.get("/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Volume increased to 52%");
    assert_eq!(body["severity"], "success");
}

#[tokio::test]
async fn test_address_health_and_page() {
    let app = TestApp::new();

    let (_, body) = app.get("/api/address").await;
    assert_eq!(
        body,
        json!({"ip": "192.168.1.40", "url": "http://192.168.1.40:7777", "qr_enabled": true})
    );

    let (status, body) = app.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["platform"], "simulated");

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = response.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&html).contains("Ferrous Control"));
}

#[tokio::test]
async fn test_unknown_route_is_unsupported() {
    let app = TestApp::new();
    let (status, body) = app.post("/api/hibernate").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        result_of(body),
        CommandResult::failure("Unsupported command: hibernate")
    );

    let (_, body) = app.get("/api/status").await;
    assert_eq!(body["message"], "Unsupported command: hibernate");
    assert_eq!(body["severity"], "error");
    assert!(app.platform.calls().is_empty());
}

// ============================================================================
// Request Hygiene
// ============================================================================

#[tokio::test]
async fn test_idempotency_key_replays_first_result() {
    let app = TestApp::new();
    let request = || {
        Request::builder()
            .method(Method::POST)
            .uri("/api/shutdown")
            .header("Idempotency-Key", "tap-1")
            .body(Body::empty())
            .unwrap()
    };

    let (first_status, first) = app.send(request()).await;
    let (second_status, second) = app.send(request()).await;
    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(app.platform.call_count(PlatformCall::Shutdown), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_keyed_request_can_be_retried() {
    let app = TestApp::new();
    let request = || {
        Request::builder()
            .method(Method::POST)
            .uri("/api/sleep")
            .header("Idempotency-Key", "retry-1")
            .body(Body::empty())
            .unwrap()
    };

    // The client gives up while the platform is still working.
    app.platform.set_latency(Duration::from_millis(500));
    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), app.router.clone().oneshot(request()))
            .await;
    assert!(abandoned.is_err());

    app.platform.set_latency(Duration::ZERO);
    let (status, body) = app.send(request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_of(body), CommandResult::ok("Sleep command executed"));

    // Once completed, the key replays instead of running again.
    let (status, _) = app.send(request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.platform.call_count(PlatformCall::Sleep), 2);
}

#[tokio::test]
async fn test_burst_limit_returns_429() {
    let mut config = Config::default();
    config.limits.burst_requests = 2;
    let app = TestApp::with_config(config);

    assert_eq!(app.post("/api/volume/up").await.0, StatusCode::OK);
    assert_eq!(app.post("/api/volume/up").await.0, StatusCode::OK);

    // Reads never count against the burst.
    for _ in 0..5 {
        assert_eq!(app.get("/api/volume").await.0, StatusCode::OK);
    }
    assert_eq!(app.get("/").await.0, StatusCode::OK);

    let (status, body) = app.post("/api/volume/up").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(!result_of(body).success);
    assert_eq!(app.platform.call_count(PlatformCall::SetVolume), 2);
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let mut config = Config::default();
    config.limits.max_body_bytes = 16;
    let app = TestApp::with_config(config);

    let payload = json!({"amount": 5, "padding": "x".repeat(64)}).to_string();
    let (status, _) = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/volume/up")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::CONTENT_LENGTH, payload.len())
                .body(Body::from(payload))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.platform.calls().is_empty());
}
