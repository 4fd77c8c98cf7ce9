//! Health handlers

use crate::api::state::AppState;
use axum::{extract::State, Json};
use beacon_identity::{IdentityId, LookupKey};
use serde::Serialize;
use std::time::Duration;

const STORE_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub identity_store: String,
}

/// Health check endpoint.
///
/// An unreachable identity store reports `degraded`, not an error: requests
/// keep being served without visitor identities.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    let probe_id = IdentityId::generate();
    let probe = tokio::time::timeout(
        STORE_PROBE_TIMEOUT,
        state.store.find(LookupKey::Id(&probe_id)),
    )
    .await;

    let store_ok = matches!(probe, Ok(Ok(_)));
    if !store_ok {
        tracing::warn!("Identity store probe failed");
    }

    Json(HealthCheckResponse {
        status: if store_ok { "healthy" } else { "degraded" }.to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        identity_store: if store_ok { "ok" } else { "unavailable" }.to_string(),
    })
}
