//! Access-token caching for the Firestore backend.
//!
//! Tokens are refreshed a minute before expiry under a write lock, so
//! concurrent requests share one refresh. A failed refresh falls back to the
//! current token while it is still usable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Used when the provider reports an expiry we cannot convert.
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for Firestore REST access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Where bearer tokens come from.
pub struct TokenSource {
    inner: Inner,
}

enum Inner {
    /// Service-account credentials with a refreshable cache.
    ServiceAccount {
        provider: Arc<dyn TokenProvider>,
        cache: RwLock<Option<CachedToken>>,
    },
    /// A fixed token, as accepted by the Firestore emulator.
    Static(String),
}

impl TokenSource {
    pub fn service_account(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            inner: Inner::ServiceAccount {
                provider,
                cache: RwLock::new(None),
            },
        }
    }

    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            inner: Inner::Static(token.into()),
        }
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        if let Inner::ServiceAccount { cache, .. } = &self.inner {
            *cache.write().await = None;
        }
    }

    /// A bearer token valid for at least the refresh margin.
    pub async fn get_token(&self) -> StoreResult<String> {
        let (provider, cache) = match &self.inner {
            Inner::Static(token) => return Ok(token.clone()),
            Inner::ServiceAccount { provider, cache } => (provider, cache),
        };

        if let Some(cached) = cache.read().await.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        let mut slot = cache.write().await;
        if let Some(cached) = slot.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        match provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let now = Utc::now();
                let expires_at = if token.expires_at() > now {
                    (token.expires_at() - now)
                        .to_std()
                        .map(|ttl| Instant::now() + ttl)
                        .unwrap_or_else(|_| Instant::now() + TOKEN_DEFAULT_TTL)
                } else {
                    Instant::now()
                };

                let access_token = token.as_str().to_string();
                *slot = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                });
                debug!("Refreshed Firestore access token");
                Ok(access_token)
            }
            Err(e) => match slot.as_ref() {
                Some(cached) if cached.is_usable() => {
                    warn!("Token refresh failed, using existing token: {}", e);
                    Ok(cached.access_token.clone())
                }
                _ => Err(StoreError::auth_error(format!("Failed to obtain auth token: {}", e))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_is_returned_verbatim() {
        let source = TokenSource::fixed("owner");
        source.invalidate().await;
        assert_eq!(source.get_token().await.unwrap(), "owner");
    }

    #[test]
    fn test_scope() {
        assert!(FIRESTORE_SCOPE.ends_with("datastore"));
    }
}
