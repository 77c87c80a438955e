//! Fast2SMS gateway client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use cg_models::PhoneNumber;

use crate::error::{NotifyError, NotifyResult};
use crate::gateway::SmsGateway;

pub const DEFAULT_BASE_URL: &str = "https://www.fast2sms.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// SMS settings read from the environment.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    /// `None` means alerts are only logged.
    pub api_key: Option<String>,
    pub base_url: String,
    /// Cap for one contact's send.
    pub timeout: Duration,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SmsConfig {
    /// Read `FAST2SMS_API_KEY`, `FAST2SMS_BASE_URL` and `SMS_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("FAST2SMS_API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            base_url: std::env::var("FAST2SMS_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(
                std::env::var("SMS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT.as_secs()),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(rename = "return")]
    accepted: bool,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

/// Sends through the Fast2SMS bulk route.
pub struct Fast2SmsClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl Fast2SmsClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> NotifyResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SmsGateway for Fast2SmsClient {
    fn name(&self) -> &'static str {
        "fast2sms"
    }

    async fn send(&self, to: &PhoneNumber, message: &str) -> NotifyResult<()> {
        let url = format!("{}/dev/bulkV2", self.base_url);
        debug!(to = %to, "Sending SMS via Fast2SMS");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("authorization", self.api_key.as_str()),
                ("message", message),
                ("language", "english"),
                ("route", "q"),
                ("numbers", to.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(NotifyError::DispatchFailed(format!("HTTP {}: {}", status, body)));
        }

        let parsed: BulkResponse = serde_json::from_str(&body)
            .map_err(|e| NotifyError::InvalidResponse(format!("{} (body: {})", e, body)))?;
        if !parsed.accepted {
            let reason = parsed
                .message
                .map(|m| m.to_string())
                .unwrap_or_else(|| "gateway returned false".to_string());
            return Err(NotifyError::DispatchFailed(reason));
        }
        Ok(())
    }
}
