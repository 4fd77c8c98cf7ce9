//! Identity store selection

use crate::config::StorageConfig;
use crate::error::DaemonResult;
use beacon_identity::postgres::PostgresIdentityStore;
use beacon_identity::{IdentityStore, InMemoryIdentityStore};
use std::sync::Arc;

/// Build the identity store described by `config`.
pub async fn connect(config: &StorageConfig) -> DaemonResult<Arc<dyn IdentityStore>> {
    match config {
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory identity store; visitor identities are lost on restart");
            Ok(Arc::new(InMemoryIdentityStore::new()))
        }
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let store = PostgresIdentityStore::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            tracing::info!(max_connections, "Connected to PostgreSQL identity store");
            Ok(Arc::new(store))
        }
    }
}
