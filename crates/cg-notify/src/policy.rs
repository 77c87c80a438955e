//! Threshold and count policy.

use cg_models::{CountSource, DEFAULT_ALERT_THRESHOLD};

/// Resolves which threshold applies and what count to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    pub default_threshold: u32,
    /// Substitute for a measured zero. Off unless configured.
    pub fallback_estimate: Option<u32>,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_ALERT_THRESHOLD,
            fallback_estimate: None,
        }
    }
}

impl AlertPolicy {
    /// Read `ALERT_THRESHOLD` and `ALERT_FALLBACK_ESTIMATE`.
    pub fn from_env() -> Self {
        let read = |key: &str| std::env::var(key).ok().and_then(|s| s.trim().parse::<u32>().ok());
        Self {
            default_threshold: read("ALERT_THRESHOLD").unwrap_or(DEFAULT_ALERT_THRESHOLD),
            fallback_estimate: read("ALERT_FALLBACK_ESTIMATE"),
        }
    }

    /// Per-gate override if any, else the default.
    pub fn threshold_for(&self, gate_override: Option<u32>) -> u32 {
        gate_override.unwrap_or(self.default_threshold)
    }

    /// The count to report and where it came from.
    pub fn effective_count(&self, measured: u32) -> (u32, CountSource) {
        match self.fallback_estimate {
            Some(estimate) if measured == 0 => (estimate, CountSource::FallbackEstimated),
            _ => (measured, CountSource::Measured),
        }
    }
}
