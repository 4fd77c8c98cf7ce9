//! PostgreSQL identity store.
//!
//! One row per visitor in `visitor_identities`. `identity_id` is the primary
//! key; `fingerprint` and `ip` carry plain (non-unique) indexes. A `seq`
//! column records creation order so non-unique lookups pick the earliest row.

use crate::model::{IdentityId, IdentityRecord};
use crate::traits::{IdentityStore, LookupKey};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use uuid::Uuid;

const SELECT_COLUMNS: &str =
    "SELECT identity_id, fingerprint, ip, session_ids, created_at, updated_at FROM visitor_identities";

/// PostgreSQL-backed identity store.
#[derive(Debug, Clone)]
pub struct PostgresIdentityStore {
    pool: PgPool,
}

impl PostgresIdentityStore {
    /// Connect to PostgreSQL and initialize the schema.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool).await
    }

    /// Create the store from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS visitor_identities (
                seq BIGSERIAL NOT NULL,
                identity_id UUID PRIMARY KEY,
                fingerprint TEXT,
                ip TEXT,
                session_ids TEXT[] NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS visitor_identities_fingerprint ON visitor_identities(fingerprint, seq);"#,
            r#"CREATE INDEX IF NOT EXISTS visitor_identities_ip ON visitor_identities(ip, seq);"#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }

        Ok(())
    }

    fn record_from_row(row: &PgRow) -> StorageResult<IdentityRecord> {
        let get_err = |e: sqlx::Error| StorageError::InvalidData(e.to_string());
        let identity_id: Uuid = row.try_get("identity_id").map_err(get_err)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(get_err)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(get_err)?;
        Ok(IdentityRecord {
            identity_id: IdentityId::from_uuid(identity_id),
            fingerprint: row.try_get("fingerprint").map_err(get_err)?,
            ip: row.try_get("ip").map_err(get_err)?,
            session_ids: row.try_get("session_ids").map_err(get_err)?,
            created_at,
            updated_at,
        })
    }
}

fn map_sqlx_error(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::Conflict(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Connection(e.to_string()),
        _ => StorageError::Query(e.to_string()),
    }
}

#[async_trait]
impl IdentityStore for PostgresIdentityStore {
    async fn find(&self, key: LookupKey<'_>) -> StorageResult<Option<IdentityRecord>> {
        let row = match key {
            LookupKey::Id(id) => {
                sqlx::query(&format!("{SELECT_COLUMNS} WHERE identity_id = $1"))
                    .bind(*id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
            }
            LookupKey::Fingerprint(fp) => {
                sqlx::query(&format!(
                    "{SELECT_COLUMNS} WHERE fingerprint = $1 ORDER BY seq ASC LIMIT 1"
                ))
                .bind(fp)
                .fetch_optional(&self.pool)
                .await
            }
            LookupKey::Address(ip) => {
                sqlx::query(&format!(
                    "{SELECT_COLUMNS} WHERE ip = $1 ORDER BY seq ASC LIMIT 1"
                ))
                .bind(ip)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .map_err(map_sqlx_error)?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn create(&self, record: &IdentityRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO visitor_identities
                (identity_id, fingerprint, ip, session_ids, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*record.identity_id.as_uuid())
        .bind(record.fingerprint.as_deref())
        .bind(record.ip.as_deref())
        .bind(&record.session_ids)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    /// Session ids are merged into the stored list rather than replacing it,
    /// so concurrent updates for one visitor never drop an appended session.
    async fn update(&self, record: &IdentityRecord) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE visitor_identities
            SET fingerprint = $2,
                ip = $3,
                session_ids = session_ids || ARRAY(
                    SELECT s FROM unnest($4::text[]) WITH ORDINALITY AS t(s, n)
                    WHERE NOT (s = ANY(visitor_identities.session_ids))
                    ORDER BY n
                ),
                updated_at = $5
            WHERE identity_id = $1
            "#,
        )
        .bind(*record.identity_id.as_uuid())
        .bind(record.fingerprint.as_deref())
        .bind(record.ip.as_deref())
        .bind(&record.session_ids)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "identity {}",
                record.identity_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATABASE_URL_ENV: &str = "BEACON_TEST_DATABASE_URL";

    async fn test_store() -> Option<PostgresIdentityStore> {
        let url = std::env::var(DATABASE_URL_ENV).ok()?;
        Some(
            PostgresIdentityStore::connect_with_options(&url, 2, 5)
                .await
                .unwrap(),
        )
    }

    // Requires a database:
    // BEACON_TEST_DATABASE_URL=postgres://... cargo test --features postgres -- --ignored
    #[tokio::test]
    #[ignore]
    async fn concurrent_session_appends_are_both_kept() {
        let Some(store) = test_store().await else {
            return;
        };

        let record = IdentityRecord::new(None, None, Some("s1".into()), Utc::now());
        store.create(&record).await.unwrap();

        // Two requests read the same row, each appending its own session.
        let mut first = record.clone();
        first.session_ids.push("s2".into());
        let mut second = record.clone();
        second.session_ids.push("s3".into());

        store.update(&first).await.unwrap();
        store.update(&second).await.unwrap();

        let stored = store
            .find(LookupKey::Id(&record.identity_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.session_ids, vec!["s1", "s2", "s3"]);
    }

    #[tokio::test]
    #[ignore]
    async fn update_of_unknown_identity_is_not_found() {
        let Some(store) = test_store().await else {
            return;
        };

        let record = IdentityRecord::new(Some("fp".into()), None, None, Utc::now());
        let err = store.update(&record).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
