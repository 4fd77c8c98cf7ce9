//! API request handlers

mod health;
mod metrics;
mod visitor;

pub use health::*;
pub use metrics::*;
pub use visitor::*;

use crate::error::ApiError;
use axum::http::Uri;

/// Fallback for unknown routes
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}
