//! HTTP routes for the gateway.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::crypto::{TokenCodec, TokenLifetimes};
use crate::errors::GatewayError;
use crate::handlers;
use crate::middleware::{gateway_layer, http_metrics_middleware, GatewayState};
use crate::pipeline::{with_response_decorators, Pipeline, PipelineSettings};
use crate::proxy::Forwarder;
use crate::repositories::RouteStore;
use crate::services::key_manager::KeyManager;
use crate::services::route_table::RouteTable;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Added to the forward timeout for the whole-request timeout, so that a slow
/// upstream surfaces as 504 from the forwarder rather than 408 from the layer.
const REQUEST_TIMEOUT_MARGIN_SECONDS: u64 = 5;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Arc<Config>,

    /// Active and previous signing keys.
    pub keys: Arc<KeyManager>,

    /// Token issuance and validation.
    pub codec: TokenCodec,

    /// Route rules.
    pub routes: RouteTable,

    /// Request stages.
    pub pipeline: Pipeline,

    /// Upstream client.
    pub forwarder: Forwarder,
}

impl AppState {
    pub fn new(
        config: Config,
        keys: Arc<KeyManager>,
        route_store: Arc<dyn RouteStore>,
    ) -> Result<Self, GatewayError> {
        let codec = TokenCodec::new(keys.clone(), TokenLifetimes::from(&config));
        let routes = RouteTable::new(route_store);
        let pipeline = Pipeline::new(
            PipelineSettings::from_config(&config),
            codec.clone(),
            routes.clone(),
        );
        let forwarder = Forwarder::new(Duration::from_secs(config.forward_timeout_seconds))?;

        Ok(Self {
            config: Arc::new(config),
            keys,
            codec,
            routes,
            pipeline,
            forwarder,
        })
    }
}

async fn not_found() -> GatewayError {
    GatewayError::NotFound("Resource not found".to_string())
}

/// Build the application routes.
///
/// Local routes:
/// - `/health` - Liveness probe
/// - `/metrics` - Prometheus metrics endpoint
/// - `{internal}admin/routes` - Route rule management (ADMIN)
/// - `{internal}admin/keys/rotate` - Manual key rotation (ADMIN)
///
/// Every request passes through the gateway layer first. It rewrites the URI
/// before local routing, so `/api/admin/routes` reaches the same handler as
/// `/server/admin/routes`, and forwards granted rules with a target URL
/// without touching the local routes at all.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let config = state.config.clone();
    let internal = config.internal_api_prefix.as_str();
    let gateway_state = Arc::new(GatewayState {
        pipeline: state.pipeline.clone(),
        forwarder: state.forwarder.clone(),
    });
    let request_timeout = Duration::from_secs(
        config.forward_timeout_seconds + REQUEST_TIMEOUT_MARGIN_SECONDS,
    );

    let app_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            &format!("{}admin/routes", internal),
            post(handlers::upsert_route)
                .get(handlers::get_routes)
                .delete(handlers::delete_route),
        )
        .route(
            &format!("{}admin/keys/rotate", internal),
            post(handlers::rotate_keys),
        )
        .fallback(not_found)
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let local_routes = app_routes.merge(metrics_routes);
    let gateway = Router::new()
        .fallback_service(local_routes)
        .layer(middleware::from_fn_with_state(gateway_state, gateway_layer));
    let decorated = with_response_decorators(
        gateway,
        &config.cors,
        &config.security_headers,
    );

    // Layer order (bottom-to-top execution):
    // 1. gateway_layer - Pipeline and forwarding (innermost)
    // 2. CorsLayer - CORS headers, answers preflight requests
    // 3. security_headers_middleware - Security headers on every response
    // 4. TraceLayer - Log request details
    // 5. TimeoutLayer - Whole-request timeout
    // 6. http_metrics_middleware - Record ALL responses (outermost)
    decorated
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(http_metrics_middleware))
}
