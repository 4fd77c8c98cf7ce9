//! Beacon daemon library
//!
//! Hosts the visitor identity middleware behind an axum server:
//! - REST API handlers (health, current visitor, metrics)
//! - Identity store selection
//! - Authentication hand-off from a trusted upstream header
//! - Client address from the socket peer
//! - Server lifecycle management

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod peer;
pub mod server;
pub mod storage;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, DaemonResult};
pub use server::Server;
