//! Guard (alert contact) models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::account::AccountId;
use crate::error::{ModelError, ModelResult};

/// Unique identifier for a guard record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct GuardId(pub String);

impl GuardId {
    /// Generate a new random guard ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GuardId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GuardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for GuardId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GuardId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Duty status shown on the guard roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum GuardStatus {
    #[default]
    Active,
    #[serde(rename = "On Break")]
    OnBreak,
    Responding,
    Offline,
}

impl GuardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardStatus::Active => "Active",
            GuardStatus::OnBreak => "On Break",
            GuardStatus::Responding => "Responding",
            GuardStatus::Offline => "Offline",
        }
    }
}

impl fmt::Display for GuardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GuardStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(GuardStatus::Active),
            "on break" | "on_break" => Ok(GuardStatus::OnBreak),
            "responding" => Ok(GuardStatus::Responding),
            "offline" => Ok(GuardStatus::Offline),
            _ => Err(ModelError::InvalidStatus(s.to_string())),
        }
    }
}

/// A registered guard assigned to a gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Guard {
    pub id: GuardId,
    /// Owning account.
    pub user_email: AccountId,
    pub name: String,
    /// Mobile number as entered; normalized only at dispatch time.
    pub mobile: String,
    pub gate: String,
    #[serde(default)]
    pub status: GuardStatus,
    pub created_at: DateTime<Utc>,
}

/// Request body for registering a guard.
#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
pub struct NewGuard {
    #[validate(email(message = "user_email must be a valid email address"))]
    pub user_email: String,
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 32, message = "mobile must be 1-32 characters"))]
    pub mobile: String,
    #[validate(length(min = 1, max = 64, message = "gate must be 1-64 characters"))]
    pub gate: String,
    #[serde(default)]
    pub status: Option<GuardStatus>,
}

impl NewGuard {
    /// Validate the request and build a new guard record.
    pub fn into_guard(self) -> ModelResult<Guard> {
        self.validate()?;
        Ok(Guard {
            id: GuardId::new(),
            user_email: AccountId::parse(&self.user_email)?,
            name: self.name.trim().to_string(),
            mobile: self.mobile.trim().to_string(),
            gate: self.gate.trim().to_string(),
            status: self.status.unwrap_or_default(),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NewGuard {
        NewGuard {
            user_email: "Ops@GateHouse.in".to_string(),
            name: " Ravi ".to_string(),
            mobile: "+91 98765-43210".to_string(),
            gate: "GateA".to_string(),
            status: None,
        }
    }

    #[test]
    fn test_into_guard_defaults_status_and_normalizes_account() {
        let guard = request().into_guard().unwrap();
        assert_eq!(guard.status, GuardStatus::Active);
        assert_eq!(guard.user_email.as_str(), "ops@gatehouse.in");
        assert_eq!(guard.name, "Ravi");
        assert!(!guard.id.as_str().is_empty());
    }

    #[test]
    fn test_into_guard_rejects_missing_fields() {
        let mut req = request();
        req.gate = String::new();
        assert!(matches!(req.into_guard(), Err(ModelError::Validation(_))));

        let mut req = request();
        req.user_email = "nobody".to_string();
        assert!(req.into_guard().is_err());
    }

    #[test]
    fn test_status_serde_names() {
        assert_eq!(serde_json::to_string(&GuardStatus::OnBreak).unwrap(), "\"On Break\"");
        assert_eq!("on_break".parse::<GuardStatus>().unwrap(), GuardStatus::OnBreak);
        assert!("asleep".parse::<GuardStatus>().is_err());
    }
}
