//! Router assembly and server startup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Router};
use tokio::sync::watch;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use sequencer_operations::{MetricsRegistry, SequencerMetrics};
use sequencer_pool::SharedBundlePool;

use crate::auth::{self, UserStore};
use crate::handlers;
use crate::health;
use crate::rate_limit::{self, RateLimits};

/// Maximum time a request may spend in a handler.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on concurrently processed requests.
const MAX_IN_FLIGHT_REQUESTS: usize = 1024;

/// Shared state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    /// The bundle pool, shared with the dispatcher and cleanup job.
    pub pool: SharedBundlePool,
    /// User database and token authority.
    pub users: Arc<UserStore>,
    /// Request budgets.
    pub rate_limits: Arc<RateLimits>,
    /// Metric handles (unregistered no-ops when metrics are disabled).
    pub metrics: SequencerMetrics,
    /// Full registry, present only when `/metrics` is served.
    pub registry: Option<Arc<MetricsRegistry>>,
}

impl AppState {
    pub fn new(
        pool: SharedBundlePool,
        users: Arc<UserStore>,
        rate_limits: Arc<RateLimits>,
        registry: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        let metrics = registry
            .as_ref()
            .map(|r| r.sequencer.clone())
            .unwrap_or_default();
        Self {
            pool,
            users,
            rate_limits,
            metrics,
            registry,
        }
    }
}

/// Build the ingress router.
///
/// Bundle endpoints require a bearer token with the `user` role; every route
/// under `/sequencer` is rate limited. `/metrics` sits outside the prefix
/// and is only mounted when a registry is present.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/eth_sendBundle", post(handlers::handle_send_bundle))
        .route("/eth_cancelBundle", post(handlers::handle_cancel_bundle))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::user_auth,
        ));

    let open = Router::new()
        .route("/health", get(health::handle_health))
        .route("/login", post(auth::handle_login));

    let sequencer = protected.merge(open).route_layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit::rate_limit,
    ));

    let mut app = Router::new().nest("/sequencer", sequencer);
    if state.registry.is_some() {
        app = app.route("/metrics", get(handle_metrics));
    }

    app.layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT_REQUESTS))
        .with_state(state)
}

/// Handler for `GET /metrics`.
async fn handle_metrics(State(state): State<AppState>) -> Response {
    let Some(registry) = &state.registry else {
        return StatusCode::NOT_FOUND.into_response();
    };
    state.metrics.set_pool_live(state.pool.len() as i64);
    (
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        registry.encode_prometheus(),
    )
        .into_response()
}

/// Bind and serve until shutdown is signalled.
///
/// In-flight connections are drained gracefully; the caller bounds the drain
/// with its own timeout.
pub async fn serve(
    addr: SocketAddr,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "starting HTTP ingress server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.changed().await;
    })
    .await
}
