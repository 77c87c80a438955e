//! Threshold-gated alert dispatch.
//!
//! Contacts are notified one after another. A failure for one contact is
//! logged and recorded on its outcome; the rest of the roster still gets the
//! message. Sends are never retried so a slow gateway cannot produce
//! duplicate texts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use cg_models::{DeliveryMode, DispatchOutcome, Guard, PhoneNumber};

use crate::error::{NotifyError, NotifyResult};
use crate::fast2sms::{Fast2SmsClient, SmsConfig, DEFAULT_TIMEOUT};
use crate::gateway::SmsGateway;
use crate::message::compose_alert_message;
use crate::metrics;

/// Someone to notify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    /// Raw number as entered; normalized at dispatch time.
    pub mobile: String,
}

impl Contact {
    pub fn new(name: impl Into<String>, mobile: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mobile: mobile.into(),
        }
    }
}

impl From<&Guard> for Contact {
    fn from(guard: &Guard) -> Self {
        Self::new(guard.name.clone(), guard.mobile.clone())
    }
}

/// Sends crowd alerts to a gate's contacts.
pub struct AlertDispatcher {
    gateway: Option<Arc<dyn SmsGateway>>,
    per_contact_timeout: Duration,
}

impl AlertDispatcher {
    /// Dispatcher that delivers through `gateway`.
    pub fn new(gateway: Arc<dyn SmsGateway>, per_contact_timeout: Duration) -> Self {
        Self {
            gateway: Some(gateway),
            per_contact_timeout,
        }
    }

    /// Dispatcher that only logs what it would send.
    pub fn logged_only() -> Self {
        Self {
            gateway: None,
            per_contact_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build from config: Fast2SMS when a key is present, log-only otherwise.
    pub fn from_config(config: &SmsConfig) -> NotifyResult<Self> {
        match &config.api_key {
            Some(key) => {
                let client =
                    Fast2SmsClient::new(key.clone(), config.base_url.clone(), config.timeout)?;
                info!("SMS alerts will be delivered via Fast2SMS");
                Ok(Self::new(Arc::new(client), config.timeout))
            }
            None => {
                warn!("FAST2SMS_API_KEY not set; crowd alerts will only be logged");
                Ok(Self::logged_only())
            }
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        if self.gateway.is_some() {
            DeliveryMode::Real
        } else {
            DeliveryMode::LoggedOnly
        }
    }

    /// Notify every contact with a valid number when `count > threshold`.
    ///
    /// Returns one outcome per targeted contact; empty when below threshold.
    pub async fn dispatch(
        &self,
        count: u32,
        threshold: u32,
        gate: &str,
        contacts: &[Contact],
    ) -> Vec<DispatchOutcome> {
        if count <= threshold {
            return Vec::new();
        }

        let message = compose_alert_message(count, gate);
        let mode = self.mode();
        let mut outcomes = Vec::with_capacity(contacts.len());

        for contact in contacts {
            let phone = match PhoneNumber::normalize(&contact.mobile) {
                Ok(phone) => phone,
                Err(e) => {
                    warn!(gate = %gate, contact = %contact.name, "Skipping contact: {}", e);
                    metrics::record_skipped_contact();
                    continue;
                }
            };

            let delivered = match &self.gateway {
                None => {
                    info!(gate = %gate, to = %phone, mode = mode.as_str(), "ALERT: {}", message);
                    true
                }
                Some(gateway) => match self.send_one(gateway.as_ref(), &phone, &message).await {
                    Ok(()) => {
                        info!(gate = %gate, to = %phone, gateway = gateway.name(), "Alert sent");
                        true
                    }
                    Err(e) => {
                        warn!(
                            gate = %gate,
                            to = %phone,
                            gateway = gateway.name(),
                            "Alert not delivered: {}", e
                        );
                        false
                    }
                },
            };

            metrics::record_alert(mode, delivered);
            outcomes.push(DispatchOutcome {
                name: contact.name.clone(),
                phone,
                mode,
                delivered,
            });
        }

        info!(
            gate = %gate,
            count,
            threshold,
            targeted = outcomes.len(),
            delivered = outcomes.iter().filter(|o| o.delivered).count(),
            "Crowd alert dispatched"
        );
        outcomes
    }

    async fn send_one(
        &self,
        gateway: &dyn SmsGateway,
        phone: &PhoneNumber,
        message: &str,
    ) -> NotifyResult<()> {
        tokio::time::timeout(self.per_contact_timeout, gateway.send(phone, message))
            .await
            .map_err(|_| NotifyError::Timeout(self.per_contact_timeout))?
    }
}
