//! API Router configuration

use super::handlers;
use super::state::AppState;
use crate::auth::{mark_authenticated, TrustedUserHeader};
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::peer::attach_client_addr;
use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use beacon_identity::with_identity;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the main API router.
///
/// Request order: trace, CORS, timeout, authentication hand-off, client
/// address, visitor identity, handler.
pub fn create_router(state: AppState, config: &DaemonConfig) -> DaemonResult<Router> {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/visitor", get(handlers::current_visitor));

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics_handler))
        .fallback(handlers::not_found);

    router = with_identity(router, state.identity.clone());

    if !config.server.trust_forwarded_for {
        router = router.layer(middleware::from_fn(attach_client_addr));
    }

    if let Some(header) = &config.auth.trusted_user_header {
        let header = TrustedUserHeader(Arc::from(header.to_ascii_lowercase()));
        router = router.layer(middleware::from_fn_with_state(header, mark_authenticated));
    }

    router = router.layer(TimeoutLayer::new(Duration::from_secs(
        config.server.request_timeout_secs,
    )));

    if config.server.enable_cors {
        router = router.layer(cors_layer(&config.server.cors_allowed_origins)?);
    }

    Ok(router.layer(TraceLayer::new_for_http()).with_state(state))
}

/// Without an origin list any origin may call, but browsers will not send
/// the identity cookie. Listing origins enables credentialed requests.
fn cors_layer(origins: &[String]) -> DaemonResult<CorsLayer> {
    if origins.is_empty() {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o)
                .map_err(|e| DaemonError::Config(format!("Invalid CORS origin {o:?}: {e}")))
        })
        .collect::<DaemonResult<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}
