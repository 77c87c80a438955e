//! Camera registration handlers.

use axum::extract::State;
use axum::Json;
use cg_models::{Camera, UpsertCamera};

use super::MessageResponse;
use crate::error::ApiResult;
use crate::extract::AccountScope;
use crate::state::AppState;

/// Save the camera for a gate, replacing any previous address.
pub async fn upsert_camera(
    State(state): State<AppState>,
    scope: Option<AccountScope>,
    Json(request): Json<UpsertCamera>,
) -> ApiResult<Json<MessageResponse>> {
    let camera = request.into_camera()?;
    let account = scope.map(|s| s.0).unwrap_or_else(|| camera.user_email.clone());

    state.cameras(&account).upsert(&camera).await?;
    Ok(Json(MessageResponse::new(format!(
        "RTSP Link for {} saved successfully!",
        camera.gate
    ))))
}

/// List the account's cameras.
pub async fn list_cameras(
    State(state): State<AppState>,
    scope: AccountScope,
) -> ApiResult<Json<Vec<Camera>>> {
    let cameras = state.cameras(scope.account()).list().await?;
    Ok(Json(cameras))
}
