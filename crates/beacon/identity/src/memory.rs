//! In-memory identity store.
//!
//! Deterministic and test-friendly. Records are kept in creation order, so
//! non-unique lookups return the earliest created match. Production
//! deployments should use the PostgreSQL backend.

use crate::model::{IdentityId, IdentityRecord};
use crate::traits::{IdentityStore, LookupKey};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    records: Vec<IdentityRecord>,
    by_id: HashMap<IdentityId, usize>,
}

/// In-memory visitor identity store for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    inner: RwLock<Inner>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Fetch a record by id.
    pub async fn get(&self, id: &IdentityId) -> Option<IdentityRecord> {
        let inner = self.inner.read().await;
        inner.by_id.get(id).map(|&idx| inner.records[idx].clone())
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find(&self, key: LookupKey<'_>) -> StorageResult<Option<IdentityRecord>> {
        let inner = self.inner.read().await;
        let found = match key {
            LookupKey::Id(id) => inner.by_id.get(id).map(|&idx| &inner.records[idx]),
            LookupKey::Fingerprint(fp) => inner
                .records
                .iter()
                .find(|r| r.fingerprint.as_deref() == Some(fp)),
            LookupKey::Address(ip) => inner.records.iter().find(|r| r.ip.as_deref() == Some(ip)),
        };
        Ok(found.cloned())
    }

    async fn create(&self, record: &IdentityRecord) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        if inner.by_id.contains_key(&record.identity_id) {
            return Err(StorageError::Conflict(format!(
                "identity {} already exists",
                record.identity_id
            )));
        }
        let idx = inner.records.len();
        inner.records.push(record.clone());
        inner.by_id.insert(record.identity_id, idx);
        Ok(())
    }

    async fn update(&self, record: &IdentityRecord) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let idx = *inner
            .by_id
            .get(&record.identity_id)
            .ok_or_else(|| StorageError::NotFound(format!("identity {}", record.identity_id)))?;
        let stored = &mut inner.records[idx];
        // created_at is immutable
        stored.fingerprint = record.fingerprint.clone();
        stored.ip = record.ip.clone();
        for session_id in &record.session_ids {
            if !stored.has_session(session_id) {
                stored.session_ids.push(session_id.clone());
            }
        }
        stored.updated_at = record.updated_at;
        Ok(())
    }
}
