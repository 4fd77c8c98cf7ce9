//! Identity resolution settings

use crate::binder::{CookiePolicy, SameSite};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for signal extraction, token binding and store access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Cookie carrying the visitor identity id
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Cookie carrying the session id appended to `session_ids`
    #[serde(default = "default_session_cookie")]
    pub session_cookie: Option<String>,

    /// Header carrying the device fingerprint
    #[serde(default = "default_fingerprint_header")]
    pub fingerprint_header: String,

    /// Cookie path
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,

    /// Token validity window in days
    #[serde(default = "default_max_age_days")]
    pub cookie_max_age_days: u32,

    /// Emit the `Secure` attribute
    #[serde(default = "default_true")]
    pub cookie_secure: bool,

    /// `SameSite` attribute
    #[serde(default)]
    pub cookie_same_site: SameSite,

    /// Deadline for each individual store operation, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            session_cookie: default_session_cookie(),
            fingerprint_header: default_fingerprint_header(),
            cookie_path: default_cookie_path(),
            cookie_max_age_days: default_max_age_days(),
            cookie_secure: true,
            cookie_same_site: SameSite::default(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl IdentityConfig {
    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy {
            name: self.cookie_name.clone(),
            path: self.cookie_path.clone(),
            max_age: chrono::Duration::days(i64::from(self.cookie_max_age_days)),
            secure: self.cookie_secure,
            same_site: self.cookie_same_site,
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn default_cookie_name() -> String {
    "visitor_id".to_string()
}

fn default_session_cookie() -> Option<String> {
    Some("sid".to_string())
}

fn default_fingerprint_header() -> String {
    crate::signals::FINGERPRINT_HEADER.to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_max_age_days() -> u32 {
    365
}

fn default_true() -> bool {
    true
}

fn default_store_timeout_ms() -> u64 {
    2_000
}
