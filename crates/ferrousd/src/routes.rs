//! API routes for the network control endpoint
//!
//! Every command route answers with the uniform `CommandResult` body. The
//! browser confirms destructive actions itself before posting, so these
//! handlers dispatch as `Origin::Network`.

use crate::dispatcher::Origin;
use crate::network::{AdvertisedAddress, Lookup, StoredOutcome};
use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ferrous_shared::{
    Command, CommandKind, CommandResult, ControlError, Severity, ShutdownSnapshot, StatusView,
    VolumeResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

type AppStateArc = Arc<AppState>;
type ApiError = (StatusCode, Json<CommandResult>);

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Optional body of the relative volume routes
#[derive(Debug, Default, Deserialize)]
pub struct VolumeAdjustRequest {
    pub amount: Option<i32>,
}

/// Body of `POST /api/volume/set`
#[derive(Debug, Deserialize)]
pub struct SetVolumeRequest {
    pub volume: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub platform: String,
    pub confirmation_pending: bool,
}

fn api_error(err: ControlError) -> ApiError {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(CommandResult::from(err)))
}

impl From<Result<CommandResult, ControlError>> for StoredOutcome {
    fn from(outcome: Result<CommandResult, ControlError>) -> Self {
        match outcome {
            Ok(result) => StoredOutcome {
                status: StatusCode::OK.as_u16(),
                result,
            },
            Err(e) => StoredOutcome {
                status: e.http_status(),
                result: CommandResult::from(e),
            },
        }
    }
}

impl IntoResponse for StoredOutcome {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.result)).into_response()
    }
}

/// Dispatch one network command, honouring an `Idempotency-Key` header.
async fn dispatch(state: &AppState, headers: &HeaderMap, command: Command) -> Response {
    let key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string);

    let mut reservation = None;
    if let Some(key) = &key {
        match state.idempotency.begin(key) {
            Lookup::Fresh(claim) => reservation = Some(claim),
            Lookup::Replay(stored) => {
                debug!("  Replaying stored result for key {}", key);
                return stored.into_response();
            }
            Lookup::InFlight => {
                return (
                    StatusCode::CONFLICT,
                    Json(CommandResult::failure("Request with this key is still running")),
                )
                    .into_response();
            }
        }
    }

    // Dropping this future before here releases the key through the reservation.
    let stored = StoredOutcome::from(state.dispatcher.execute(command, Origin::Network).await);
    if let Some(reservation) = reservation {
        reservation.complete(stored.clone());
    }
    stored.into_response()
}

/// Empty or whitespace body means "no amount"
fn parse_optional<T: for<'de> Deserialize<'de> + Default>(body: &Bytes) -> Result<T, ControlError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}

// ============================================================================
// Power Routes
// ============================================================================

pub fn power_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/shutdown", post(shutdown))
        .route("/api/cancel", post(cancel))
        .route("/api/sleep", post(sleep))
        .route("/api/restart", post(restart))
}

async fn shutdown(State(state): State<AppStateArc>, headers: HeaderMap) -> Response {
    dispatch(&state, &headers, Command::shutdown()).await
}

async fn cancel(State(state): State<AppStateArc>, headers: HeaderMap) -> Response {
    dispatch(&state, &headers, Command::cancel_shutdown()).await
}

async fn sleep(State(state): State<AppStateArc>, headers: HeaderMap) -> Response {
    dispatch(&state, &headers, Command::sleep()).await
}

/// Old clients posted "restart" for sleep; the route is configurable.
async fn restart(State(state): State<AppStateArc>, headers: HeaderMap) -> Response {
    let kind = state.config.power.restart_route.command_kind();
    dispatch(&state, &headers, Command::new(kind)).await
}

// ============================================================================
// Volume Routes
// ============================================================================

pub fn volume_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/volume", get(get_volume))
        .route("/api/volume/get", get(get_volume))
        .route("/api/volume/up", post(volume_up))
        .route("/api/volume/increase", post(volume_up))
        .route("/api/volume/down", post(volume_down))
        .route("/api/volume/decrease", post(volume_down))
        .route("/api/volume/set", post(set_volume))
}

async fn get_volume(State(state): State<AppStateArc>) -> Result<Json<VolumeResponse>, ApiError> {
    state.dispatcher.volume().await.map(Json).map_err(api_error)
}

async fn volume_up(State(state): State<AppStateArc>, headers: HeaderMap, body: Bytes) -> Response {
    adjust(&state, &headers, CommandKind::VolumeUp, &body).await
}

async fn volume_down(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    adjust(&state, &headers, CommandKind::VolumeDown, &body).await
}

async fn adjust(state: &AppState, headers: &HeaderMap, kind: CommandKind, body: &Bytes) -> Response {
    let request: VolumeAdjustRequest = match parse_optional(body) {
        Ok(request) => request,
        Err(e) => return api_error(e).into_response(),
    };
    let amount = request.amount.unwrap_or(state.config.volume.step);
    dispatch(state, headers, Command::with_amount(kind, amount)).await
}

async fn set_volume(State(state): State<AppStateArc>, headers: HeaderMap, body: Bytes) -> Response {
    let request: SetVolumeRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return api_error(ControlError::from(e)).into_response(),
    };
    dispatch(&state, &headers, Command::set_volume(request.volume)).await
}

// ============================================================================
// State Routes
// ============================================================================

pub fn state_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/shutdown/state", get(shutdown_state))
        .route("/api/address", get(address))
        .route("/api/health", get(health_check))
}

async fn status(State(state): State<AppStateArc>) -> Json<Option<StatusView>> {
    Json(state.dispatcher.status(Origin::Network))
}

async fn shutdown_state(State(state): State<AppStateArc>) -> Json<ShutdownSnapshot> {
    Json(state.dispatcher.shutdown_snapshot().await)
}

async fn address(State(state): State<AppStateArc>) -> Json<AdvertisedAddress> {
    Json(state.address.clone())
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        platform: state.dispatcher.platform_name().to_string(),
        confirmation_pending: state.dispatcher.gate().is_pending(),
    })
}

// ============================================================================
// Remote Page
// ============================================================================

pub fn page_routes() -> Router<AppStateArc> {
    Router::new().route("/", get(index))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Anything unrouted; reported as an unsupported command on the network
/// status like any other failure.
pub async fn unsupported(State(state): State<AppStateArc>, uri: Uri) -> ApiError {
    info!("  Unsupported route: {}", uri.path());
    let name = uri
        .path()
        .trim_start_matches("/api/")
        .trim_start_matches('/')
        .to_string();
    let err = ControlError::UnsupportedCommand(name);
    state
        .dispatcher
        .publish(Origin::Network, err.to_string(), Severity::Error);
    api_error(err)
}
