//! Request rate limiting, per client IP and global.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{DefaultDirectRateLimiter, DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::error::IngressError;
use crate::server::AppState;

/// Header consulted for the client address when the service runs behind a
/// proxy.
pub const XFF_HEADER: &str = "x-forwarded-for";

/// Sliding-window request budgets, per client IP and across all clients.
pub struct RateLimits {
    per_client: DefaultKeyedRateLimiter<IpAddr>,
    global: DefaultDirectRateLimiter,
}

impl RateLimits {
    /// Create limiters with the given per-minute budgets.
    pub fn new(per_client_per_minute: u32, global_per_minute: u32) -> Self {
        let per_client =
            Quota::per_minute(NonZeroU32::new(per_client_per_minute).unwrap_or(NonZeroU32::MIN));
        let global =
            Quota::per_minute(NonZeroU32::new(global_per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            per_client: RateLimiter::keyed(per_client),
            global: RateLimiter::direct(global),
        }
    }

    /// Charge one request against both windows.
    pub fn check(&self, client: IpAddr) -> Result<(), IngressError> {
        if self.per_client.check_key(&client).is_err() {
            return Err(IngressError::RateLimited);
        }
        if self.global.check().is_err() {
            return Err(IngressError::GlobalRateLimited);
        }
        Ok(())
    }
}

/// Middleware applying [`RateLimits`] to every request under the prefix.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let client = client_ip(&request);
    match state.rate_limits.check(client) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            tracing::warn!(%client, "request rate limited");
            err.into_response()
        }
    }
}

/// Client address: first `X-Forwarded-For` hop, else the socket peer.
fn client_ip(request: &Request) -> IpAddr {
    if let Some(xff) = request
        .headers()
        .get(XFF_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = xff.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return ip;
            }
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}
