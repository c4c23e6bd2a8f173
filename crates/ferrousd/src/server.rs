//! HTTP server for the network control endpoint

use crate::config::Config;
use crate::dispatcher::CommandDispatcher;
use crate::network::{rate_limit_middleware, AdvertisedAddress, IdempotencyStore, RateLimiter};
use crate::routes;
use axum::Router;
use ferrous_shared::ControlError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// How often expired idempotency keys and idle peers are pruned
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Application state shared across handlers
pub struct AppState {
    pub dispatcher: Arc<CommandDispatcher>,
    pub config: Config,
    pub address: AdvertisedAddress,
    pub idempotency: IdempotencyStore,
    pub rate_limiter: RateLimiter,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(dispatcher: Arc<CommandDispatcher>, config: Config, address: AdvertisedAddress) -> Self {
        let limits = &config.limits;
        Self {
            idempotency: IdempotencyStore::new(
                limits.idempotency_capacity,
                Duration::from_secs(limits.idempotency_ttl_secs),
            ),
            rate_limiter: RateLimiter::new(
                limits.burst_requests,
                Duration::from_secs(limits.burst_window_secs),
            ),
            start_time: Instant::now(),
            dispatcher,
            config,
            address,
        }
    }
}

/// Build the full router: routes, rate limiting, body limit, tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let rate_limiter = state.rate_limiter.clone();
    let max_body = state.config.limits.max_body_bytes;

    Router::new()
        .merge(routes::power_routes())
        .merge(routes::volume_routes())
        .merge(routes::state_routes())
        .merge(routes::page_routes())
        .fallback(routes::unsupported)
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(TraceLayer::new_for_http())
}

/// Bind the configured address. Failure is reported as `NetworkUnavailable`
/// so the local panel can keep running without the endpoint.
pub async fn bind(config: &Config) -> Result<TcpListener, ControlError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| ControlError::NetworkUnavailable(format!("cannot bind {}: {}", addr, e)))
}

/// Serve until `shutdown` resolves
pub async fn run(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ControlError> {
    let local_addr = listener.local_addr()?;
    info!("  Listening on http://{}", local_addr);

    let maintenance = spawn_maintenance(Arc::clone(&state));
    let app = router(state);

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await;

    maintenance.abort();
    served.map_err(ControlError::from)
}

fn spawn_maintenance(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            state.idempotency.prune_expired();
            state.rate_limiter.cleanup().await;
            debug!("Idempotency keys tracked: {}", state.idempotency.len());
        }
    })
}
