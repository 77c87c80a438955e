//! Crowd analysis request and response types.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::alert::{CountSource, DispatchOutcome};
use crate::error::ModelError;

/// Visualization applied to live frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Boxes and labels over the original colour frame.
    #[default]
    Object,
    /// Simulated heat map; a cosmetic transform, not a sensor reading.
    Thermal,
}

impl DetectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMode::Object => "object",
            DetectionMode::Thermal => "thermal",
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DetectionMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "object" | "" => Ok(DetectionMode::Object),
            "thermal" => Ok(DetectionMode::Thermal),
            _ => Err(ModelError::InvalidMode(s.to_string())),
        }
    }
}

/// Result of analyzing an uploaded clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub gate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub crowd_count: u32,
    pub count_source: CountSource,
    pub frames_processed: u32,
    pub threshold: u32,
    pub threshold_exceeded: bool,
    /// `Name (phone)` for every contact targeted.
    pub messages_sent: Vec<String>,
    pub dispatch: Vec<DispatchOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("object".parse::<DetectionMode>().unwrap(), DetectionMode::Object);
        assert_eq!("THERMAL".parse::<DetectionMode>().unwrap(), DetectionMode::Thermal);
        assert!("infrared".parse::<DetectionMode>().is_err());
    }

    #[test]
    fn test_response_field_names() {
        let response = AnalysisResponse {
            gate: "GateA".to_string(),
            filename: None,
            crowd_count: 4,
            count_source: CountSource::Measured,
            frames_processed: 20,
            threshold: 3,
            threshold_exceeded: true,
            messages_sent: vec![],
            dispatch: vec![],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["crowdCount"], 4);
        assert_eq!(json["thresholdExceeded"], true);
        assert_eq!(json["countSource"], "measured");
        assert!(json.get("filename").is_none());
    }
}
