//! Visitor identity data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Primary key of a visitor identity and the value carried in the client token.
///
/// Rendered as a lowercase hyphenated UUID. Generated once at creation and
/// never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(Uuid);

impl IdentityId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a token value. Returns `None` for anything that is not a UUID.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// One resolved anonymous visitor.
///
/// `fingerprint` and `ip` are hints, not keys: several records may share
/// them, and both are overwritten when a returning visitor presents new
/// values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub identity_id: IdentityId,
    pub fingerprint: Option<String>,
    pub ip: Option<String>,
    /// Append-only, in order of first observation.
    pub session_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdentityRecord {
    /// Build a fresh record with a newly generated id.
    pub fn new(
        fingerprint: Option<String>,
        ip: Option<String>,
        session_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            identity_id: IdentityId::generate(),
            fingerprint,
            ip,
            session_ids: session_id.into_iter().collect(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.session_ids.iter().any(|s| s == session_id)
    }
}
