//! Guard management handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use cg_models::{AccountId, Guard, GuardId, NewGuard};
use tracing::info;

use super::MessageResponse;
use crate::error::{ApiError, ApiResult};
use crate::extract::AccountScope;
use crate::state::AppState;

/// Create a guard for the account named in the body.
///
/// When an `X-Account-Id` header is also sent it must match the body.
pub async fn create_guard(
    State(state): State<AppState>,
    scope: Option<AccountScope>,
    Json(request): Json<NewGuard>,
) -> ApiResult<(StatusCode, Json<Guard>)> {
    let guard = request.into_guard()?;
    let account: AccountId = scope.map(|s| s.0).unwrap_or_else(|| guard.user_email.clone());

    state.guards(&account).create(&guard).await?;
    Ok((StatusCode::CREATED, Json(guard)))
}

/// List the account's guards.
pub async fn list_guards(
    State(state): State<AppState>,
    scope: AccountScope,
) -> ApiResult<Json<Vec<Guard>>> {
    let guards = state.guards(scope.account()).list().await?;
    Ok(Json(guards))
}

/// Delete one of the account's guards.
pub async fn delete_guard(
    State(state): State<AppState>,
    scope: AccountScope,
    Path(guard_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let id = GuardId::from(guard_id);
    if !state.guards(scope.account()).delete(&id).await? {
        return Err(ApiError::not_found("Guard not found"));
    }
    info!(account = %scope.account(), guard_id = %id, "Guard removed via API");
    Ok(Json(MessageResponse::new("Guard deleted successfully")))
}
