//! Live annotated camera feed.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use cg_media::{LiveStream, MediaError, SourceInput, MJPEG_CONTENT_TYPE};
use cg_models::{AccountId, DetectionMode};
use cg_notify::{Contact, LiveAlertMonitor};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::extract::AccountScope;
use crate::metrics;
use crate::state::AppState;

pub const CAMERA_NOT_CONFIGURED: &str = "Camera not configured";
pub const CAMERA_UNAVAILABLE: &str = "Camera stream unavailable";

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub mode: Option<String>,
}

/// Stream the gate's camera as MJPEG with detections drawn in.
///
/// The stream runs until the client disconnects or the camera stops. Either
/// way the decoder is released when the response body is dropped.
pub async fn video_feed(
    State(state): State<AppState>,
    scope: AccountScope,
    Path(gate): Path<String>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Response> {
    let mode = match query.mode.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        Some(raw) => raw.parse::<DetectionMode>()?,
        None => DetectionMode::default(),
    };

    let camera = state
        .cameras(scope.account())
        .get(&gate)
        .await?
        .ok_or_else(|| ApiError::not_found(CAMERA_NOT_CONFIGURED))?;

    let detector = state.require_detector()?;
    let sources = state.require_sources()?;

    let input = SourceInput::from(camera.source()?);
    let source = match sources.open(&input).await {
        Ok(source) => source,
        Err(e @ MediaError::SourceOpenFailed { .. }) => {
            warn!(account = %scope.account(), gate = %gate, "Camera unavailable: {}", e);
            return Err(ApiError::unavailable(CAMERA_UNAVAILABLE));
        }
        Err(e) => return Err(e.into()),
    };

    let mut live = LiveStream::new(source, detector, mode)
        .with_quality(state.config.stream_jpeg_quality)
        .with_shutdown(state.shutdown.clone());
    if state.config.live_alerts_enabled {
        live = live.with_count_observer(start_live_alerts(&state, scope.account(), &gate).await?);
    }

    info!(account = %scope.account(), gate = %gate, mode = mode.as_str(), "Serving live feed");
    metrics::record_feed_opened(mode.as_str());

    let mut response = (
        [
            (header::CONTENT_TYPE, MJPEG_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        Body::from_stream(live.into_stream()),
    )
        .into_response();

    if mode == DetectionMode::Thermal {
        // The thermal palette is rendered from visible light, not a real sensor.
        response
            .headers_mut()
            .insert("x-visualization", HeaderValue::from_static("simulated-thermal"));
    }
    Ok(response)
}

/// Spawn the alert monitor for a feed and return the sender it listens to.
async fn start_live_alerts(
    state: &AppState,
    account: &AccountId,
    gate: &str,
) -> ApiResult<watch::Sender<u32>> {
    let gate_override = state
        .gate_settings(account)
        .get(gate)
        .await?
        .map(|s| s.alert_threshold);
    let threshold = state.policy.threshold_for(gate_override);
    let contacts: Vec<Contact> = state
        .guards(account)
        .list_for_gate(gate)
        .await?
        .iter()
        .map(Contact::from)
        .collect();

    let (counts, receiver) = watch::channel(0u32);
    LiveAlertMonitor::new(Arc::clone(&state.dispatcher), state.alert_cooldowns.clone()).spawn(
        receiver,
        account.clone(),
        gate.to_string(),
        threshold,
        contacts,
    );
    Ok(counts)
}
