//! Request middleware: per-peer burst rate limiting
//!
//! LAN callers are trusted to issue commands, but a misbehaving page in a
//! reload loop must not be able to hammer the platform. Only commands count
//! against the burst; reads (the page, volume re-polls, status) do not.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use ferrous_shared::CommandResult;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rate limiter state
#[derive(Clone)]
pub struct RateLimiter {
    // Track requests per peer IP
    peer_requests: Arc<RwLock<HashMap<String, Vec<Instant>>>>,
    burst_requests: usize,
    burst_window: Duration,
}

impl RateLimiter {
    pub fn new(burst_requests: usize, burst_window: Duration) -> Self {
        Self {
            peer_requests: Arc::new(RwLock::new(HashMap::new())),
            burst_requests,
            burst_window,
        }
    }

    /// Record a request from `peer`; false when the peer is over its burst.
    pub async fn check_peer_rate_limit(&self, peer: &str) -> bool {
        let mut requests = self.peer_requests.write().await;
        let peer_reqs = requests.entry(peer.to_string()).or_default();
        let now = Instant::now();

        peer_reqs.retain(|&timestamp| now.duration_since(timestamp) < self.burst_window);

        if peer_reqs.len() >= self.burst_requests {
            warn!(
                "Peer burst rate limit exceeded for: {} ({}/{})",
                peer,
                peer_reqs.len(),
                self.burst_requests
            );
            return false;
        }

        peer_reqs.push(now);
        true
    }

    /// Clean up old entries (call periodically)
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut peer_requests = self.peer_requests.write().await;
        peer_requests.retain(|_, timestamps| {
            timestamps.retain(|&ts| now.duration_since(ts) < self.burst_window);
            !timestamps.is_empty()
        });
        debug!("Rate limiter cleanup: {} active peers", peer_requests.len());
    }
}

/// Rate limit middleware keyed by the connecting peer's IP
pub async fn rate_limit_middleware(
    State(rate_limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    if matches!(*request.method(), Method::GET | Method::HEAD) {
        return next.run(request).await;
    }
    let peer = extract_peer_addr(&request);

    if !rate_limiter.check_peer_rate_limit(&peer).await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(CommandResult::failure("Too many requests, slow down")),
        )
            .into_response();
    }

    next.run(request).await
}

/// Peer IP from the connection, when the server was started with connect info
fn extract_peer_addr(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
