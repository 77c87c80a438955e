//! Account scoping extractor.
//!
//! Every guard, camera and settings route is scoped to one account. The
//! account comes from the `X-Account-Id` header or, failing that, the
//! `user_email` query parameter used by the dashboard.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use cg_models::AccountId;
use serde::Deserialize;

use crate::error::ApiError;

pub const ACCOUNT_HEADER: &str = "X-Account-Id";

#[derive(Debug, Deserialize)]
struct AccountQuery {
    user_email: Option<String>,
}

/// The account a request acts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountScope(pub AccountId);

impl AccountScope {
    /// Resolve the account from request parts.
    pub fn from_parts(parts: &Parts) -> Result<Self, ApiError> {
        let from_header = parts
            .headers
            .get(ACCOUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let raw = match from_header {
            Some(raw) => raw,
            None => Query::<AccountQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(q)| q.user_email)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ApiError::validation("user_email is required"))?,
        };

        Ok(Self(AccountId::parse(&raw)?))
    }

    pub fn account(&self) -> &AccountId {
        &self.0
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AccountScope
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts)
    }
}
