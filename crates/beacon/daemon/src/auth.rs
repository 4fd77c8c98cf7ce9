//! Authentication hand-off.
//!
//! Turns a trusted upstream header into the [`AuthenticatedUser`] marker the
//! identity middleware checks. Must run before it.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use beacon_identity::AuthenticatedUser;
use std::sync::Arc;

/// Name of the header set by the upstream authenticator.
#[derive(Debug, Clone)]
pub struct TrustedUserHeader(pub Arc<str>);

pub async fn mark_authenticated(
    State(TrustedUserHeader(header)): State<TrustedUserHeader>,
    mut request: Request,
    next: Next,
) -> Response {
    let user_id = request
        .headers()
        .get(header.as_ref())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    if let Some(user_id) = user_id {
        request
            .extensions_mut()
            .insert(AuthenticatedUser { user_id });
    }

    next.run(request).await
}
