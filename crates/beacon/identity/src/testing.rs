//! Store fakes for resolver and middleware tests.

use crate::memory::InMemoryIdentityStore;
use crate::model::IdentityRecord;
use crate::traits::{IdentityStore, LookupKey};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory store that counts every call.
#[derive(Default)]
pub struct CountingStore {
    inner: InMemoryIdentityStore,
    finds: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.finds() + self.creates() + self.updates()
    }
}

#[async_trait]
impl IdentityStore for CountingStore {
    async fn find(&self, key: LookupKey<'_>) -> StorageResult<Option<IdentityRecord>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(key).await
    }

    async fn create(&self, record: &IdentityRecord) -> StorageResult<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create(record).await
    }

    async fn update(&self, record: &IdentityRecord) -> StorageResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(record).await
    }
}

/// Store that fails lookups or writes on demand.
pub struct FailingStore {
    inner: InMemoryIdentityStore,
    fail_finds: bool,
    fail_writes: bool,
}

impl FailingStore {
    pub fn failing_finds() -> Self {
        Self {
            inner: InMemoryIdentityStore::new(),
            fail_finds: true,
            fail_writes: false,
        }
    }

    pub fn failing_writes() -> Self {
        Self::failing_writes_over(InMemoryIdentityStore::new())
    }

    /// Reads succeed against `inner`; creates and updates fail.
    pub fn failing_writes_over(inner: InMemoryIdentityStore) -> Self {
        Self {
            inner,
            fail_finds: false,
            fail_writes: true,
        }
    }

    fn unavailable() -> StorageError {
        StorageError::Connection("identity store unavailable".to_string())
    }
}

#[async_trait]
impl IdentityStore for FailingStore {
    async fn find(&self, key: LookupKey<'_>) -> StorageResult<Option<IdentityRecord>> {
        if self.fail_finds {
            return Err(Self::unavailable());
        }
        self.inner.find(key).await
    }

    async fn create(&self, record: &IdentityRecord) -> StorageResult<()> {
        if self.fail_writes {
            return Err(Self::unavailable());
        }
        self.inner.create(record).await
    }

    async fn update(&self, record: &IdentityRecord) -> StorageResult<()> {
        if self.fail_writes {
            return Err(Self::unavailable());
        }
        self.inner.update(record).await
    }
}

/// Store whose calls never complete.
pub struct HangingStore;

#[async_trait]
impl IdentityStore for HangingStore {
    async fn find(&self, _key: LookupKey<'_>) -> StorageResult<Option<IdentityRecord>> {
        std::future::pending().await
    }

    async fn create(&self, _record: &IdentityRecord) -> StorageResult<()> {
        std::future::pending().await
    }

    async fn update(&self, _record: &IdentityRecord) -> StorageResult<()> {
        std::future::pending().await
    }
}
