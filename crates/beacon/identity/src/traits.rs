use crate::model::{IdentityId, IdentityRecord};
use crate::StorageResult;
use async_trait::async_trait;

/// Key for a single-record lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKey<'a> {
    /// Exact primary key match.
    Id(&'a IdentityId),
    /// Non-unique; the earliest created match is returned.
    Fingerprint(&'a str),
    /// Non-unique; the earliest created match is returned.
    Address(&'a str),
}

/// Storage interface for visitor identity records.
///
/// Each call is one independent atomic record operation. No multi-record
/// transaction is assumed.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Find at most one record. Non-unique keys must resolve deterministically
    /// to the earliest created matching record.
    async fn find(&self, key: LookupKey<'_>) -> StorageResult<Option<IdentityRecord>>;

    /// Insert a new record. Fails with `Conflict` if the id already exists.
    async fn create(&self, record: &IdentityRecord) -> StorageResult<()>;

    /// Overwrite fingerprint, ip and `updated_at` of an existing record.
    /// Session ids are append-only: ids not yet stored are appended in
    /// order, none are removed. Fails with `NotFound` if the id is unknown.
    async fn update(&self, record: &IdentityRecord) -> StorageResult<()>;
}
