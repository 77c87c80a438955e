//! Per-gate settings handlers.

use axum::extract::{Path, State};
use axum::Json;
use cg_models::UpdateGateSettings;
use serde::Serialize;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::extract::AccountScope;
use crate::state::AppState;

/// Effective settings for a gate.
#[derive(Debug, Serialize)]
pub struct GateSettingsResponse {
    pub gate: String,
    pub alert_threshold: u32,
    /// False when the global default applies.
    pub overridden: bool,
}

fn gate_name(raw: &str) -> ApiResult<String> {
    let gate = raw.trim();
    if gate.is_empty() || gate.len() > 64 {
        return Err(ApiError::validation("gate must be 1-64 characters"));
    }
    Ok(gate.to_string())
}

/// Read the threshold that applies to a gate.
pub async fn get_gate_settings(
    State(state): State<AppState>,
    scope: AccountScope,
    Path(gate): Path<String>,
) -> ApiResult<Json<GateSettingsResponse>> {
    let gate = gate_name(&gate)?;
    let stored = state.gate_settings(scope.account()).get(&gate).await?;
    let overridden = stored.is_some();
    let alert_threshold = state.policy.threshold_for(stored.map(|s| s.alert_threshold));

    Ok(Json(GateSettingsResponse {
        gate,
        alert_threshold,
        overridden,
    }))
}

/// Override a gate's threshold.
pub async fn update_gate_settings(
    State(state): State<AppState>,
    scope: AccountScope,
    Path(gate): Path<String>,
    Json(request): Json<UpdateGateSettings>,
) -> ApiResult<Json<GateSettingsResponse>> {
    request.validate()?;
    let gate = gate_name(&gate)?;
    let saved = state
        .gate_settings(scope.account())
        .set_threshold(&gate, request.alert_threshold)
        .await?;

    Ok(Json(GateSettingsResponse {
        gate: saved.gate,
        alert_threshold: saved.alert_threshold,
        overridden: true,
    }))
}
