//! Account records: signup, login and password reset.
//!
//! These endpoints only manage the stored records. They issue no session
//! token; callers identify the account on later requests by its email.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use cg_models::{AccountId, LoginRequest, ResetPasswordRequest, SignupRequest, User};
use cg_store::{hash_password, verify_password, StoreError};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use validator::Validate;

use super::MessageResponse;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub name: String,
    pub email: String,
}

/// Register a new account.
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    request.validate()?;
    let user = User {
        name: request.name.trim().to_string(),
        email: AccountId::parse(&request.email)?,
        mobile: request.mobile.trim().to_string(),
        password_hash: hash_password(&request.password)?,
        created_at: Utc::now(),
    };

    match state.users().create(&user).await {
        Ok(()) => Ok((StatusCode::CREATED, Json(MessageResponse::new("Registration successful!")))),
        Err(StoreError::AlreadyExists(_)) => Err(ApiError::validation("Email already registered!")),
        Err(e) => Err(e.into()),
    }
}

/// Check an email and password pair.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    request.validate()?;
    let email = AccountId::parse(&request.email)?;

    let user = state.users().find_by_email(&email).await?;
    match user {
        Some(user) if verify_password(&request.password, &user.password_hash) => {
            info!(account = %email, "Login succeeded");
            Ok(Json(LoginResponse {
                message: "Login successful".to_string(),
                name: user.name,
                email: email.to_string(),
            }))
        }
        _ => {
            warn!(account = %email, "Login rejected");
            Err(ApiError::unauthorized("Invalid Email or Password!"))
        }
    }
}

/// Replace a password.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    request.validate()?;
    let email = AccountId::parse(&request.email)?;

    let password_hash = hash_password(&request.new_password)?;
    if !state.users().update_password(&email, password_hash).await? {
        return Err(ApiError::not_found("Account not found"));
    }
    Ok(Json(MessageResponse::new("Password updated successfully")))
}
