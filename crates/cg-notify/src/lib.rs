//! Crowd alert policy and SMS dispatch.
//!
//! This crate provides:
//! - The alert message template
//! - An [`SmsGateway`] seam with a Fast2SMS implementation
//! - [`AlertDispatcher`], which falls back to log-only delivery without a key
//! - [`AlertPolicy`] for thresholds and the optional zero-count fallback
//! - [`LiveAlertMonitor`] for alerts raised from live feeds

pub mod dispatcher;
pub mod error;
pub mod fast2sms;
pub mod gateway;
pub mod message;
pub mod metrics;
pub mod monitor;
pub mod policy;

pub use dispatcher::{AlertDispatcher, Contact};
pub use error::{NotifyError, NotifyResult};
pub use fast2sms::{Fast2SmsClient, SmsConfig};
pub use gateway::SmsGateway;
pub use message::compose_alert_message;
pub use monitor::{AlertCooldowns, LiveAlertMonitor};
pub use policy::AlertPolicy;
