//! Health check handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub store: CheckStatus,
    pub detector: CheckStatus,
    pub decoder: CheckStatus,
    pub sms: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Which implementation answered, e.g. the detector name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

impl CheckStatus {
    fn ok(latency_ms: Option<u64>) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms,
            backend: None,
        }
    }

    fn with_backend(mut self, backend: &str) -> Self {
        self.backend = Some(backend.to_string());
        self
    }

    fn degraded(msg: impl Into<String>) -> Self {
        Self {
            status: "degraded".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
            backend: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
            backend: None,
        }
    }
}

/// Readiness check endpoint (readiness).
///
/// Only the store gates readiness. A missing detector or decoder disables
/// analysis and feeds but the guard and camera APIs still work.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let store = {
        let start = Instant::now();
        match state.store.ping().await {
            Ok(()) => CheckStatus::ok(Some(start.elapsed().as_millis() as u64))
                .with_backend(state.store.backend()),
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    let detector = match &state.detector {
        Some(d) => CheckStatus::ok(None).with_backend(d.name()),
        None => CheckStatus::degraded("no person detector in this build"),
    };

    let decoder = match &state.sources {
        Some(_) => CheckStatus::ok(None),
        None => CheckStatus::degraded("ffmpeg not found"),
    };

    let sms = CheckStatus::ok(None).with_backend(state.dispatcher.mode().as_str());

    let store_ok = store.status == "ok";
    let response = ReadinessResponse {
        status: if store_ok { "ready" } else { "unavailable" }.to_string(),
        checks: ReadinessChecks {
            store,
            detector,
            decoder,
            sms,
        },
    };

    if store_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
