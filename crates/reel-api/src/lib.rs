//! Axum webhook server for the render orchestrator.
//!
//! This crate provides:
//! - `POST /webhook` job submission with admission control
//! - Health and Prometheus metrics endpoints
//! - The `reel-submit` client for queued submission and completion polling

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
