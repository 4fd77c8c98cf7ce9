//! Visitor handlers

use axum::{Extension, Json};
use beacon_identity::{AuthenticatedUser, Strategy, Visitor};
use serde::{Deserialize, Serialize};

/// Current visitor response
#[derive(Debug, Serialize, Deserialize)]
pub struct VisitorResponse {
    pub resolved: bool,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<Strategy>,
}

/// Report how the current request was identified
pub async fn current_visitor(
    Visitor(visitor): Visitor,
    user: Option<Extension<AuthenticatedUser>>,
) -> Json<VisitorResponse> {
    Json(VisitorResponse {
        resolved: visitor.is_some(),
        authenticated: user.is_some(),
        identity_id: visitor.as_ref().map(|v| v.identity_id.to_string()),
        is_new: visitor.as_ref().map(|v| v.is_new),
        matched_by: visitor.and_then(|v| v.matched_by),
    })
}
