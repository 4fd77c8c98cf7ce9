//! Token binding.
//!
//! Exposes the resolved identity to downstream handlers through request
//! extensions and issues the durable client token on the response.

use crate::model::IdentityId;
use crate::resolver::{Resolution, Strategy};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{InvalidHeaderValue, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, HeaderValue};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    /// Required when the front-end is served from another site.
    #[default]
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes of the identity cookie. `HttpOnly` is always set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePolicy {
    pub name: String,
    pub path: String,
    pub max_age: Duration,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            name: "visitor_id".to_string(),
            path: "/".to_string(),
            max_age: Duration::days(365),
            secure: true,
            same_site: SameSite::None,
        }
    }
}

/// Resolved visitor as seen by downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorContext {
    pub identity_id: IdentityId,
    pub is_new: bool,
    pub matched_by: Option<Strategy>,
}

/// Extractor for the current visitor. Never rejects; `None` means the
/// request is anonymous and unresolved (authenticated, or the store was
/// unavailable).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Visitor(pub Option<VisitorContext>);

#[async_trait]
impl<S> FromRequestParts<S> for Visitor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Visitor(parts.extensions.get::<VisitorContext>().cloned()))
    }
}

/// Attaches resolution results to requests and responses.
#[derive(Debug, Clone, Default)]
pub struct TokenBinder {
    policy: CookiePolicy,
}

impl TokenBinder {
    pub fn new(policy: CookiePolicy) -> Self {
        Self { policy }
    }

    /// Insert a [`VisitorContext`] for resolved identities. Skipped and
    /// degraded resolutions attach nothing.
    pub fn bind_request(
        &self,
        resolution: &Resolution,
        extensions: &mut Extensions,
    ) -> Option<VisitorContext> {
        let resolved = resolution.resolved()?;
        let context = VisitorContext {
            identity_id: resolved.identity.identity_id,
            is_new: resolved.is_new,
            matched_by: resolved.matched_by,
        };
        extensions.insert(context.clone());
        Some(context)
    }

    /// Append a fresh identity cookie when a visitor was resolved. Existing
    /// `Set-Cookie` headers from the handler are preserved.
    pub fn bind_response(
        &self,
        context: Option<&VisitorContext>,
        headers: &mut HeaderMap,
        now: DateTime<Utc>,
    ) {
        let Some(context) = context else {
            return;
        };
        match self.cookie(&context.identity_id, now) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => {
                tracing::warn!(error = %e, cookie = %self.policy.name, "invalid identity cookie");
            }
        }
    }

    /// Render the `Set-Cookie` value. Each issuance restarts the validity
    /// window from `now`.
    pub fn cookie(
        &self,
        identity_id: &IdentityId,
        now: DateTime<Utc>,
    ) -> Result<HeaderValue, InvalidHeaderValue> {
        let policy = &self.policy;
        let mut cookie = format!(
            "{}={}; Path={}; Max-Age={}",
            policy.name,
            identity_id,
            policy.path,
            policy.max_age.num_seconds(),
        );
        // Max-Age alone still bounds the cookie when the date is unrepresentable.
        if let Some(expires) = now.checked_add_signed(policy.max_age) {
            cookie.push_str(&format!(
                "; Expires={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            ));
        }
        cookie.push_str("; HttpOnly");
        if policy.secure {
            cookie.push_str("; Secure");
        }
        cookie.push_str("; SameSite=");
        cookie.push_str(policy.same_site.as_str());
        HeaderValue::from_str(&cookie)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IdentityRecord;
    use crate::resolver::{DegradedReason, ResolvedIdentity, StoreOperation};
    use crate::StorageError;
    use chrono::TimeZone;

    fn resolved(is_new: bool) -> Resolution {
        Resolution::Resolved(ResolvedIdentity {
            identity: IdentityRecord::new(None, None, None, Utc::now()),
            is_new,
            matched_by: (!is_new).then_some(Strategy::Token),
        })
    }

    #[test]
    fn cookie_carries_required_attributes() {
        let binder = TokenBinder::default();
        let id = IdentityId::generate();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let value = binder.cookie(&id, now).unwrap();
        let value = value.to_str().unwrap();

        assert!(value.starts_with(&format!("visitor_id={id};")));
        assert!(value.contains("Max-Age=31536000"));
        assert!(value.contains("Expires=Mon, 01 Mar 2027 12:00:00 GMT"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Secure"));
        assert!(value.contains("SameSite=None"));
        assert!(value.contains("Path=/"));
    }

    #[test]
    fn oversized_max_age_omits_expires() {
        let binder = TokenBinder::new(CookiePolicy {
            max_age: chrono::Duration::days(100_000_000),
            ..CookiePolicy::default()
        });
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let value = binder.cookie(&IdentityId::generate(), now).unwrap();
        let value = value.to_str().unwrap();

        assert!(value.contains("Max-Age=8640000000000"));
        assert!(!value.contains("Expires="));
        assert!(value.contains("HttpOnly"));
    }

    #[test]
    fn insecure_lax_policy() {
        let binder = TokenBinder::new(CookiePolicy {
            secure: false,
            same_site: SameSite::Lax,
            ..CookiePolicy::default()
        });
        let value = binder.cookie(&IdentityId::generate(), Utc::now()).unwrap();
        let value = value.to_str().unwrap();
        assert!(!value.contains("Secure"));
        assert!(value.ends_with("SameSite=Lax"));
    }

    #[test]
    fn resolved_identity_binds_context_and_cookie() {
        let binder = TokenBinder::default();
        let resolution = resolved(true);
        let mut extensions = Extensions::new();

        let context = binder.bind_request(&resolution, &mut extensions).unwrap();
        assert!(context.is_new);
        assert_eq!(extensions.get::<VisitorContext>(), Some(&context));

        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("other=1"));
        binder.bind_response(Some(&context), &mut headers, Utc::now());
        assert_eq!(headers.get_all(SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn refresh_restarts_expiry() {
        let binder = TokenBinder::default();
        let id = IdentityId::generate();
        let first = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

        let a = binder.cookie(&id, first).unwrap();
        let b = binder.cookie(&id, later).unwrap();
        assert!(a.to_str().unwrap().contains("Expires=Fri, 01 Jan 2027"));
        assert!(b.to_str().unwrap().contains("Expires=Tue, 01 Jun 2027"));
    }

    #[test]
    fn skipped_and_degraded_bind_nothing() {
        let binder = TokenBinder::default();
        let degraded = Resolution::Degraded(DegradedReason {
            operation: StoreOperation::Create,
            error: StorageError::Connection("down".into()),
        });

        for resolution in [Resolution::Skipped, degraded] {
            let mut extensions = Extensions::new();
            let context = binder.bind_request(&resolution, &mut extensions);
            assert!(context.is_none());
            assert!(extensions.get::<VisitorContext>().is_none());

            let mut headers = HeaderMap::new();
            binder.bind_response(context.as_ref(), &mut headers, Utc::now());
            assert!(headers.get(SET_COOKIE).is_none());
        }
    }

    #[test]
    fn invalid_cookie_name_is_logged_not_fatal() {
        let binder = TokenBinder::new(CookiePolicy {
            name: "bad\nname".into(),
            ..CookiePolicy::default()
        });
        let context = VisitorContext {
            identity_id: IdentityId::generate(),
            is_new: true,
            matched_by: None,
        };
        let mut headers = HeaderMap::new();
        binder.bind_response(Some(&context), &mut headers, Utc::now());
        assert!(headers.get(SET_COOKIE).is_none());
    }
}
