//! Client address from the accepted connection.
//!
//! Promotes the socket peer to [`ClientAddr`] so the identity middleware
//! prefers it over client-supplied `x-forwarded-for`. Skipped when the
//! daemon sits behind a trusted proxy (`server.trust_forwarded_for`).

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::Response;
use beacon_identity::ClientAddr;
use std::net::SocketAddr;

pub async fn attach_client_addr(mut request: Request, next: Next) -> Response {
    let peer = match request.extensions().get::<ClientAddr>() {
        Some(_) => None,
        None => request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip()),
    };
    if let Some(ip) = peer {
        request.extensions_mut().insert(ClientAddr(ip));
    }

    next.run(request).await
}
