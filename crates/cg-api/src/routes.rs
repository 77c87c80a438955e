//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{
    analyze_video, create_guard, delete_guard, get_gate_settings, health, list_cameras,
    list_guards, login, ready, reset_password, signup, update_gate_settings, upsert_camera,
    video_feed,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // Short request/response routes get the request timeout.
    let record_routes = Router::new()
        .route("/guards", post(create_guard).get(list_guards))
        .route("/guards/:guard_id", delete(delete_guard))
        .route("/cameras", post(upsert_camera).get(list_cameras))
        .route("/gates/:gate/settings", get(get_gate_settings).put(update_gate_settings))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/reset-password", post(reset_password))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout,
        ));

    // Bounded by the analysis budget or by the client's connection.
    let media_routes = Router::new()
        .route("/analyze-video", post(analyze_video))
        .route("/video-feed/:gate", get(video_feed));

    let rate_limiter = Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    let api_routes = Router::new()
        .merge(record_routes)
        .merge(media_routes)
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Uploads can be large; the explicit limit below replaces axum's 2MB default.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
