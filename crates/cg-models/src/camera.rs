//! Camera feed models.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use crate::account::AccountId;
use crate::error::{ModelError, ModelResult};

/// URL schemes accepted for network camera feeds.
const STREAM_SCHEMES: &[&str] = &["rtsp", "rtsps", "rtmp", "http", "https"];

/// Connection status reported for a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum CameraStatus {
    Online,
    #[default]
    Offline,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Online => "Online",
            CameraStatus::Offline => "Offline",
        }
    }
}

impl std::str::FromStr for CameraStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "online" => Ok(CameraStatus::Online),
            "offline" => Ok(CameraStatus::Offline),
            _ => Err(ModelError::InvalidStatus(s.to_string())),
        }
    }
}

/// Where a camera's frames come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CameraSource {
    /// Local capture device index (`"0"` is the first webcam).
    Device(u32),
    /// Network stream URL (RTSP, RTMP or HTTP).
    Url(String),
}

impl CameraSource {
    /// Parse a stored camera address.
    pub fn parse(raw: &str) -> ModelResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ModelError::InvalidCameraSource("address is empty".to_string()));
        }

        if raw.chars().all(|c| c.is_ascii_digit()) {
            return raw
                .parse()
                .map(CameraSource::Device)
                .map_err(|_| {
                    ModelError::InvalidCameraSource(format!("device index out of range: {}", raw))
                });
        }

        let url = Url::parse(raw)
            .map_err(|e| ModelError::InvalidCameraSource(format!("{}: {}", raw, e)))?;
        if !STREAM_SCHEMES.contains(&url.scheme()) {
            return Err(ModelError::InvalidCameraSource(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        Ok(CameraSource::Url(raw.to_string()))
    }
}

impl fmt::Display for CameraSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraSource::Device(index) => write!(f, "device:{}", index),
            CameraSource::Url(url) => write!(f, "{}", url),
        }
    }
}

/// A camera registered for one gate of one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Camera {
    pub user_email: AccountId,
    pub gate: String,
    pub rtsp_url: String,
    #[serde(default)]
    pub status: CameraStatus,
    pub updated_at: DateTime<Utc>,
}

impl Camera {
    /// Resolve the stored address into a frame source descriptor.
    pub fn source(&self) -> ModelResult<CameraSource> {
        CameraSource::parse(&self.rtsp_url)
    }
}

/// Request body for saving a gate's camera.
#[derive(Debug, Clone, Deserialize, Validate, JsonSchema)]
pub struct UpsertCamera {
    #[validate(email(message = "user_email must be a valid email address"))]
    pub user_email: String,
    #[validate(length(min = 1, max = 64, message = "gate must be 1-64 characters"))]
    pub gate: String,
    #[validate(length(min = 1, max = 2048, message = "rtsp_url must be 1-2048 characters"))]
    pub rtsp_url: String,
    #[serde(default)]
    pub status: Option<CameraStatus>,
}

impl UpsertCamera {
    /// Validate the request and build the camera record.
    pub fn into_camera(self) -> ModelResult<Camera> {
        self.validate()?;
        CameraSource::parse(&self.rtsp_url)?;
        Ok(Camera {
            user_email: AccountId::parse(&self.user_email)?,
            gate: self.gate.trim().to_string(),
            rtsp_url: self.rtsp_url.trim().to_string(),
            status: self.status.unwrap_or_default(),
            updated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_source_device_index() {
        assert_eq!(CameraSource::parse("0").unwrap(), CameraSource::Device(0));
        assert_eq!(CameraSource::parse(" 2 ").unwrap(), CameraSource::Device(2));
    }

    #[test]
    fn test_camera_source_urls() {
        let src = CameraSource::parse("rtsp://10.0.0.4:554/stream1").unwrap();
        assert_eq!(src, CameraSource::Url("rtsp://10.0.0.4:554/stream1".to_string()));
        assert!(CameraSource::parse("ftp://cam/feed").is_err());
        assert!(CameraSource::parse("not a url").is_err());
        assert!(CameraSource::parse("").is_err());
    }

    #[test]
    fn test_upsert_camera_validates_address() {
        let req = UpsertCamera {
            user_email: "ops@gatehouse.in".to_string(),
            gate: "GateA".to_string(),
            rtsp_url: "mailto:x@y".to_string(),
            status: None,
        };
        assert!(matches!(req.into_camera(), Err(ModelError::InvalidCameraSource(_))));
    }

    #[test]
    fn test_upsert_camera_default_status() {
        let camera = UpsertCamera {
            user_email: "ops@gatehouse.in".to_string(),
            gate: "GateA".to_string(),
            rtsp_url: "0".to_string(),
            status: None,
        }
        .into_camera()
        .unwrap();
        assert_eq!(camera.status, CameraStatus::Offline);
        assert_eq!(camera.source().unwrap(), CameraSource::Device(0));
    }
}
