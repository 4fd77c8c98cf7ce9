//! Visitor identity resolution.
//!
//! Per request:
//!
//! ```text
//! START -> SKIP                      (authenticated user)
//!       -> LOOKUP_BY_TOKEN       -hit-> RECONCILE
//!       -> LOOKUP_BY_FINGERPRINT -hit-> RECONCILE
//!       -> LOOKUP_BY_ADDRESS     -hit-> RECONCILE
//!       -> CREATE
//! any store failure or timeout -> DEGRADED
//! ```
//!
//! Lookups run strictly in that order and stop at the first hit. Nothing is
//! merged: when signals point at different records, the highest-priority
//! strategy decides and the other records are left alone.

use crate::metrics::IdentityMetrics;
use crate::model::IdentityRecord;
use crate::signals::SignalSet;
use crate::traits::{IdentityStore, LookupKey};
use crate::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Lookup strategy, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Token,
    Fingerprint,
    Address,
}

impl Strategy {
    pub const PRIORITY: [Strategy; 3] = [Strategy::Token, Strategy::Fingerprint, Strategy::Address];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Token => "token",
            Strategy::Fingerprint => "fingerprint",
            Strategy::Address => "address",
        }
    }

    /// Store key for this strategy, if the signal is available.
    fn lookup_key<'a>(&self, signals: &'a SignalSet) -> Option<LookupKey<'a>> {
        match self {
            Strategy::Token => signals.token_id().map(LookupKey::Id),
            Strategy::Fingerprint => signals.fingerprint.as_deref().map(LookupKey::Fingerprint),
            Strategy::Address => signals.address.as_deref().map(LookupKey::Address),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store call that can fail during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    Lookup(Strategy),
    Create,
    Update,
}

impl StoreOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::Lookup(Strategy::Token) => "lookup_token",
            StoreOperation::Lookup(Strategy::Fingerprint) => "lookup_fingerprint",
            StoreOperation::Lookup(Strategy::Address) => "lookup_address",
            StoreOperation::Create => "create",
            StoreOperation::Update => "update",
        }
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why resolution gave up without an identity.
#[derive(Debug, Error)]
#[error("{operation} failed: {error}")]
pub struct DegradedReason {
    pub operation: StoreOperation,
    #[source]
    pub error: StorageError,
}

/// Identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub identity: IdentityRecord,
    pub is_new: bool,
    /// `None` when the record was just created.
    pub matched_by: Option<Strategy>,
}

/// Outcome of one resolution. Never an error: store trouble is `Degraded`.
#[derive(Debug)]
pub enum Resolution {
    Resolved(ResolvedIdentity),
    /// Authenticated traffic; the anonymous machinery was not consulted.
    Skipped,
    /// Store failed or timed out; the request continues without an identity.
    Degraded(DegradedReason),
}

impl Resolution {
    pub fn resolved(&self) -> Option<&ResolvedIdentity> {
        match self {
            Resolution::Resolved(resolved) => Some(resolved),
            _ => None,
        }
    }

    /// Metrics/log label for the outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            Resolution::Resolved(ResolvedIdentity { is_new: true, .. }) => "created",
            Resolution::Resolved(_) => "matched",
            Resolution::Skipped => "skipped",
            Resolution::Degraded(_) => "degraded",
        }
    }
}

/// Maps signals to exactly one identity record, creating one on a total miss.
pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
    store_timeout: Duration,
    metrics: Option<Arc<IdentityMetrics>>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            metrics: None,
        }
    }

    /// Bound every individual store call. Expiry abandons the call and
    /// degrades the resolution.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<IdentityMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Resolve the visitor behind `signals`.
    pub async fn resolve(&self, authenticated: bool, signals: &SignalSet) -> Resolution {
        let started = Instant::now();

        let resolution = if authenticated {
            Resolution::Skipped
        } else {
            match self.lookup_or_create(signals).await {
                Ok(resolved) => Resolution::Resolved(resolved),
                Err(reason) => {
                    tracing::warn!(
                        operation = %reason.operation,
                        error = %reason.error,
                        "visitor identity resolution degraded"
                    );
                    Resolution::Degraded(reason)
                }
            }
        };

        if let Some(resolved) = resolution.resolved() {
            tracing::debug!(
                identity_id = %resolved.identity.identity_id,
                is_new = resolved.is_new,
                matched_by = resolved.matched_by.map(|s| s.as_str()),
                "visitor identity resolved"
            );
        }

        if let Some(metrics) = &self.metrics {
            metrics.record(&resolution, started.elapsed());
        }

        resolution
    }

    async fn lookup_or_create(&self, signals: &SignalSet) -> Result<ResolvedIdentity, DegradedReason> {
        let now = Utc::now();

        for strategy in Strategy::PRIORITY {
            let Some(key) = strategy.lookup_key(signals) else {
                continue;
            };

            let found = self
                .guarded(StoreOperation::Lookup(strategy), self.store.find(key))
                .await?;

            if let Some(mut identity) = found {
                if reconcile(&mut identity, signals, now) {
                    self.guarded(StoreOperation::Update, self.store.update(&identity))
                        .await?;
                }
                return Ok(ResolvedIdentity {
                    identity,
                    is_new: false,
                    matched_by: Some(strategy),
                });
            }
        }

        let identity = IdentityRecord::new(
            signals.fingerprint.clone(),
            signals.address.clone(),
            signals.session_id.clone(),
            now,
        );
        self.guarded(StoreOperation::Create, self.store.create(&identity))
            .await?;

        tracing::info!(
            identity_id = %identity.identity_id,
            has_fingerprint = identity.fingerprint.is_some(),
            has_address = identity.ip.is_some(),
            "created visitor identity"
        );

        Ok(ResolvedIdentity {
            identity,
            is_new: true,
            matched_by: None,
        })
    }

    async fn guarded<T, F>(&self, operation: StoreOperation, call: F) -> Result<T, DegradedReason>
    where
        F: Future<Output = StorageResult<T>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(DegradedReason { operation, error }),
            Err(_) => Err(DegradedReason {
                operation,
                error: StorageError::Timeout(self.store_timeout),
            }),
        }
    }
}

/// Apply drift to a matched record. The latest observed value wins; absent
/// signals never clear stored ones. Returns whether anything changed.
fn reconcile(record: &mut IdentityRecord, signals: &SignalSet, now: DateTime<Utc>) -> bool {
    let mut changed = false;

    if let Some(fingerprint) = signals.fingerprint.as_deref() {
        if record.fingerprint.as_deref() != Some(fingerprint) {
            record.fingerprint = Some(fingerprint.to_string());
            changed = true;
        }
    }

    if let Some(address) = signals.address.as_deref() {
        if record.ip.as_deref() != Some(address) {
            record.ip = Some(address.to_string());
            changed = true;
        }
    }

    if let Some(session_id) = signals.session_id.as_deref() {
        if !record.has_session(session_id) {
            record.session_ids.push(session_id.to_string());
            changed = true;
        }
    }

    if changed {
        record.updated_at = now;
    }
    changed
}
