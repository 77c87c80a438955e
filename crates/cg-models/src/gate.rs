//! Per-gate settings.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::account::AccountId;

/// Crowd size at or below which no alert fires, unless a gate overrides it.
pub const DEFAULT_ALERT_THRESHOLD: u32 = 3;

/// Stored alert configuration for one gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GateSettings {
    pub user_email: AccountId,
    pub gate: String,
    /// Alerts fire when the crowd count is strictly greater than this.
    pub alert_threshold: u32,
    pub updated_at: DateTime<Utc>,
}

/// Request body for changing a gate's settings.
#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
pub struct UpdateGateSettings {
    #[validate(range(max = 100000, message = "alert_threshold must be at most 100000"))]
    pub alert_threshold: u32,
}
