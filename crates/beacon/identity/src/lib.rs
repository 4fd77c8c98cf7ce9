//! Beacon anonymous visitor identity.
//!
//! Every inbound request without an authenticated user is mapped to exactly
//! one visitor identity record using three best-effort signals:
//! - a client-held token (cookie carrying the identity id)
//! - a device fingerprint header
//! - the network address of the client
//!
//! The pieces, leaves first:
//! - [`IdentityStore`]: persistence contract, with in-memory and (feature
//!   `postgres`) PostgreSQL backends
//! - [`SignalExtractor`]: pure extraction of a [`SignalSet`] from a request
//! - [`IdentityResolver`]: ordered lookup, drift reconciliation, creation
//! - [`TokenBinder`]: request context and the durable response cookie
//! - [`resolve_visitor`]: the axum middleware gluing them together
//!
//! Resolution never fails the request. Store errors and timeouts surface as
//! [`Resolution::Degraded`] and are visible only through logs and metrics.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod binder;
pub mod config;
mod error;
pub mod layer;
pub mod memory;
pub mod metrics;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod resolver;
pub mod signals;
mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use binder::{CookiePolicy, SameSite, TokenBinder, Visitor, VisitorContext};
pub use config::IdentityConfig;
pub use error::{StorageError, StorageResult};
pub use layer::{resolve_visitor, with_identity, AuthenticatedUser, ClientAddr, IdentityService};
pub use memory::InMemoryIdentityStore;
pub use metrics::IdentityMetrics;
pub use model::{IdentityId, IdentityRecord};
pub use resolver::{
    DegradedReason, IdentityResolver, Resolution, ResolvedIdentity, StoreOperation, Strategy,
};
pub use signals::{IdentityToken, SignalExtractor, SignalSet};
pub use traits::{IdentityStore, LookupKey};
