//! Identity signal extraction.
//!
//! Reads the client token, device fingerprint, session id and network address
//! from a request. Extraction never fails and never touches the store;
//! anything unusable is reported as absent.

use crate::config::IdentityConfig;
use crate::layer::ClientAddr;
use crate::model::IdentityId;
use axum::extract::ConnectInfo;
use axum::http::{header, Extensions, HeaderMap};
use std::net::{IpAddr, SocketAddr};

/// Default header carrying the device fingerprint.
pub const FINGERPRINT_HEADER: &str = "x-device-fingerprint";

/// Header carrying the proxy chain, client first.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Values broken client storage writes in place of a missing token.
const UNSET_SENTINELS: [&str; 2] = ["undefined", "null"];

/// A client token that survived sentinel filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityToken {
    /// Parses as an identity id and can be looked up.
    Valid(IdentityId),
    /// Present but not an identity id. Never looked up.
    Malformed(String),
}

impl IdentityToken {
    /// Interpret a raw cookie value. Empty values and the unset sentinels
    /// yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let value = raw.trim();
        if value.is_empty() || UNSET_SENTINELS.contains(&value) {
            return None;
        }
        Some(match IdentityId::parse(value) {
            Some(id) => IdentityToken::Valid(id),
            None => IdentityToken::Malformed(value.to_string()),
        })
    }

    pub fn identity_id(&self) -> Option<&IdentityId> {
        match self {
            IdentityToken::Valid(id) => Some(id),
            IdentityToken::Malformed(_) => None,
        }
    }
}

/// Identity evidence carried by one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalSet {
    pub client_token: Option<IdentityToken>,
    pub fingerprint: Option<String>,
    pub address: Option<String>,
    pub session_id: Option<String>,
}

impl SignalSet {
    /// Identity id from a well-formed client token.
    pub fn token_id(&self) -> Option<&IdentityId> {
        self.client_token.as_ref().and_then(IdentityToken::identity_id)
    }

    pub fn is_empty(&self) -> bool {
        self.client_token.is_none()
            && self.fingerprint.is_none()
            && self.address.is_none()
            && self.session_id.is_none()
    }
}

/// Pulls a [`SignalSet`] out of request headers and extensions.
#[derive(Debug, Clone)]
pub struct SignalExtractor {
    token_cookie: String,
    session_cookie: Option<String>,
    fingerprint_header: String,
}

impl SignalExtractor {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            token_cookie: config.cookie_name.clone(),
            session_cookie: config.session_cookie.clone(),
            fingerprint_header: config.fingerprint_header.to_ascii_lowercase(),
        }
    }

    pub fn extract(&self, headers: &HeaderMap, extensions: &Extensions) -> SignalSet {
        let client_token = cookie_value(headers, &self.token_cookie).and_then(IdentityToken::parse);
        if let Some(IdentityToken::Malformed(raw)) = &client_token {
            tracing::debug!(token_len = raw.len(), "ignoring malformed identity token");
        }

        let fingerprint = headers
            .get(self.fingerprint_header.as_str())
            .and_then(|v| v.to_str().ok())
            .and_then(non_empty);

        let session_id = self
            .session_cookie
            .as_deref()
            .and_then(|name| cookie_value(headers, name))
            .and_then(non_empty);

        let connection = extensions.get::<ClientAddr>().map(|ClientAddr(ip)| *ip);
        let forwarded = headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok());
        let socket = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        SignalSet {
            client_token,
            fingerprint,
            address: select_address(connection, forwarded, socket),
            session_id,
        }
    }
}

/// Pick the client address: the routing layer's resolved address first, then
/// the first `x-forwarded-for` hop, then the raw socket peer.
pub fn select_address(
    connection: Option<IpAddr>,
    forwarded: Option<&str>,
    socket: Option<IpAddr>,
) -> Option<String> {
    connection
        .map(render_ip)
        .or_else(|| {
            forwarded
                .and_then(|chain| chain.split(',').next())
                .and_then(normalize_address)
        })
        .or_else(|| socket.map(render_ip))
}

/// Trim a textual address; canonicalize it when it parses as an IP.
fn normalize_address(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    match value.parse::<IpAddr>() {
        Ok(ip) => Some(render_ip(ip)),
        Err(_) => Some(value.to_string()),
    }
}

/// IPv4-mapped IPv6 peers are stored as plain IPv4 so a dual-stack listener
/// and a proxy header agree on the same visitor.
fn render_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        IpAddr::V4(v4) => v4.to_string(),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// First value of the named cookie across all `Cookie` headers.
pub(crate) fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
}
