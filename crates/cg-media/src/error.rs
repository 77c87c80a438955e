//! Error types for media operations.

use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while acquiring, analyzing or encoding frames.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    /// The source could not be opened or produced no frame at all.
    #[error("Could not open video source {source_name}: {reason}")]
    SourceOpenFailed { source_name: String, reason: String },

    /// A frame could not be decoded; callers treat this as end of stream.
    #[error("Frame decode failed: {0}")]
    DecodeFailed(String),

    #[error("Person detection failed: {0}")]
    DetectionFailed(String),

    #[error("No person detector is available in this build")]
    DetectorUnavailable,

    #[error("Frame encoding failed: {0}")]
    EncodeFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a source-open failure error.
    pub fn source_open_failed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceOpenFailed {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a decode failure error.
    pub fn decode_failed(message: impl Into<String>) -> Self {
        Self::DecodeFailed(message.into())
    }

    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True when the source never became readable.
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, MediaError::SourceOpenFailed { .. } | MediaError::FfmpegNotFound)
    }
}

impl From<image::ImageError> for MediaError {
    fn from(e: image::ImageError) -> Self {
        Self::EncodeFailed(e.to_string())
    }
}
