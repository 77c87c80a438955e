//! Alert dispatch results.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::phone::PhoneNumber;

/// How a crowd count was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CountSource {
    /// Peak detections observed by the detector.
    #[default]
    Measured,
    /// Substitute value applied by the alert policy when nothing was detected.
    FallbackEstimated,
}

impl CountSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountSource::Measured => "measured",
            CountSource::FallbackEstimated => "fallback_estimated",
        }
    }
}

/// Whether a notification actually left the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Sent through the configured SMS gateway.
    Real,
    /// No gateway credential; the message was only written to the log.
    LoggedOnly,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Real => "real",
            DeliveryMode::LoggedOnly => "logged_only",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of notifying one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DispatchOutcome {
    pub name: String,
    pub phone: PhoneNumber,
    pub mode: DeliveryMode,
    /// False when the gateway errored or reported failure for this contact.
    pub delivered: bool,
}

impl DispatchOutcome {
    /// Roster line in the form `Name (9876543210)`.
    pub fn summary(&self) -> String {
        format!("{} ({})", self.name, self.phone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_summary() {
        let outcome = DispatchOutcome {
            name: "Ravi".to_string(),
            phone: PhoneNumber::normalize("9876543210").unwrap(),
            mode: DeliveryMode::LoggedOnly,
            delivered: true,
        };
        assert_eq!(outcome.summary(), "Ravi (9876543210)");
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&DeliveryMode::LoggedOnly).unwrap(), "\"logged_only\"");
        assert_eq!(
            serde_json::to_string(&CountSource::FallbackEstimated).unwrap(),
            "\"fallback_estimated\""
        );
    }
}
