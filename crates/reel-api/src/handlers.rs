//! HTTP handlers.

pub mod health;
pub mod webhook;

pub use health::health;
pub use webhook::receive_webhook;

use axum::http::Uri;

use crate::error::ApiError;

/// Fallback for unknown routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(uri.path().to_string())
}
