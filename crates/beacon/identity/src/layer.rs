//! Axum integration.
//!
//! [`resolve_visitor`] runs once per request, after authentication and before
//! the handler. It is awaited inline and never fails the request.

use crate::binder::TokenBinder;
use crate::config::IdentityConfig;
use crate::metrics::IdentityMetrics;
use crate::resolver::IdentityResolver;
use crate::signals::SignalExtractor;
use crate::traits::IdentityStore;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use std::net::IpAddr;
use std::sync::Arc;

/// Marker inserted by the authentication layer for signed-in users.
/// Its presence skips anonymous resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// Client address as resolved by the routing layer (e.g. after trusted
/// proxy handling). Preferred over forwarded headers and the socket peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub IpAddr);

/// Shared state for the identity middleware.
#[derive(Clone)]
pub struct IdentityService {
    extractor: Arc<SignalExtractor>,
    resolver: Arc<IdentityResolver>,
    binder: Arc<TokenBinder>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn IdentityStore>, config: &IdentityConfig) -> Self {
        Self::build(config, IdentityResolver::new(store).with_store_timeout(config.store_timeout()))
    }

    /// Same as [`IdentityService::new`], recording outcomes in `metrics`.
    pub fn with_metrics(
        store: Arc<dyn IdentityStore>,
        config: &IdentityConfig,
        metrics: Arc<IdentityMetrics>,
    ) -> Self {
        let resolver = IdentityResolver::new(store)
            .with_store_timeout(config.store_timeout())
            .with_metrics(metrics);
        Self::build(config, resolver)
    }

    fn build(config: &IdentityConfig, resolver: IdentityResolver) -> Self {
        Self {
            extractor: Arc::new(SignalExtractor::new(config)),
            resolver: Arc::new(resolver),
            binder: Arc::new(TokenBinder::new(config.cookie_policy())),
        }
    }
}

/// Identity middleware: extract, resolve, bind.
pub async fn resolve_visitor(
    State(service): State<IdentityService>,
    mut request: Request,
    next: Next,
) -> Response {
    let authenticated = request.extensions().get::<AuthenticatedUser>().is_some();
    let signals = service
        .extractor
        .extract(request.headers(), request.extensions());

    let resolution = service.resolver.resolve(authenticated, &signals).await;
    let context = service
        .binder
        .bind_request(&resolution, request.extensions_mut());

    let mut response = next.run(request).await;
    service
        .binder
        .bind_response(context.as_ref(), response.headers_mut(), chrono::Utc::now());
    response
}

/// Install the identity middleware on `router`. Layers added afterwards
/// (authentication in particular) run before it.
pub fn with_identity<S>(router: Router<S>, service: IdentityService) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(service, resolve_visitor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::Visitor;
    use crate::memory::InMemoryIdentityStore;
    use crate::model::IdentityId;
    use crate::testing::{CountingStore, FailingStore};
    use axum::body::Body;
    use axum::http::{header, HeaderMap, Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use axum::{Extension, Json};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn whoami(Visitor(visitor): Visitor) -> Json<Value> {
        Json(match visitor {
            Some(ctx) => json!({ "id": ctx.identity_id.to_string(), "is_new": ctx.is_new }),
            None => json!({ "id": null }),
        })
    }

    fn app(store: Arc<dyn IdentityStore>) -> Router {
        let service = IdentityService::new(store, &IdentityConfig::default());
        with_identity(Router::new().route("/whoami", get(whoami)), service)
    }

    fn authenticated_app(store: Arc<dyn IdentityStore>) -> Router {
        let service = IdentityService::new(store, &IdentityConfig::default());
        with_identity(Router::new().route("/whoami", get(whoami)), service).layer(Extension(
            AuthenticatedUser {
                user_id: "user-1".into(),
            },
        ))
    }

    async fn call(app: &Router, cookie: Option<&str>, fingerprint: Option<&str>) -> (StatusCode, HeaderMap, Value) {
        let mut builder = HttpRequest::builder().uri("/whoami");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        if let Some(fp) = fingerprint {
            builder = builder.header("x-device-fingerprint", fp);
        }
        let resp = app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    fn cookie_id(headers: &HeaderMap) -> Option<String> {
        headers
            .get(header::SET_COOKIE)?
            .to_str()
            .ok()?
            .strip_prefix("visitor_id=")?
            .split(';')
            .next()
            .map(str::to_string)
    }

    #[tokio::test]
    async fn first_request_sets_cookie_and_context() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let app = app(store.clone());

        let (status, headers, body) = call(&app, None, Some("fp-1")).await;
        assert_eq!(status, StatusCode::OK);
        let id = cookie_id(&headers).expect("identity cookie");
        assert_eq!(body["id"], Value::String(id.clone()));
        assert_eq!(body["is_new"], Value::Bool(true));

        let stored = store.get(&IdentityId::parse(&id).unwrap()).await.unwrap();
        assert_eq!(stored.fingerprint.as_deref(), Some("fp-1"));
    }

    #[tokio::test]
    async fn returning_visitor_gets_same_identity_and_refreshed_cookie() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let app = app(store.clone());

        let (_, headers, _) = call(&app, None, None).await;
        let id = cookie_id(&headers).unwrap();

        let cookie = format!("visitor_id={id}");
        let (status, headers, body) = call(&app, Some(&cookie), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cookie_id(&headers), Some(id.clone()));
        assert_eq!(body["id"], Value::String(id));
        assert_eq!(body["is_new"], Value::Bool(false));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn store_outage_still_serves_request_without_cookie() {
        for store in [FailingStore::failing_finds(), FailingStore::failing_writes()] {
            let app = app(Arc::new(store));
            let (status, headers, body) = call(&app, Some("visitor_id=null"), Some("fp")).await;

            assert_eq!(status, StatusCode::OK);
            assert!(headers.get(header::SET_COOKIE).is_none());
            assert_eq!(body["id"], Value::Null);
        }
    }

    #[tokio::test]
    async fn oversized_cookie_lifetime_still_serves_request() {
        let config = IdentityConfig {
            cookie_max_age_days: 100_000_000,
            ..IdentityConfig::default()
        };
        let service = IdentityService::new(Arc::new(InMemoryIdentityStore::new()), &config);
        let app = with_identity(Router::new().route("/whoami", get(whoami)), service);

        let (status, headers, body) = call(&app, None, Some("fp")).await;
        assert_eq!(status, StatusCode::OK);
        let id = cookie_id(&headers).expect("identity cookie");
        assert_eq!(body["id"], Value::String(id));
    }

    #[tokio::test]
    async fn authenticated_request_is_untouched() {
        let store = Arc::new(CountingStore::new());
        let app = authenticated_app(store.clone());

        let (status, headers, body) = call(&app, None, Some("fp")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get(header::SET_COOKIE).is_none());
        assert_eq!(body["id"], Value::Null);
        assert_eq!(store.total_calls(), 0);
    }
}
