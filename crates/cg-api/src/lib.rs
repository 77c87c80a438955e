//! Axum HTTP API server for CrowdGuard.
//!
//! This crate provides:
//! - Account-scoped guard, camera and gate settings APIs
//! - Uploaded clip analysis with SMS alerting
//! - Live MJPEG camera feeds in object or thermal mode
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use extract::{AccountScope, ACCOUNT_HEADER};
pub use routes::create_router;
pub use state::AppState;
