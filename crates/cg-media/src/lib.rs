//! Video frame acquisition, person detection, counting and live streaming.
//!
//! This crate provides:
//! - Frame sources over FFmpeg (files, RTSP/HTTP cameras, local devices)
//! - A pluggable person detector (OpenCV HOG behind the `opencv` feature)
//! - Bounded peak counting for uploaded clips
//! - Object and simulated-thermal annotation
//! - MJPEG multipart encoding with handle release on cancellation

#![deny(unreachable_patterns)]

pub mod annotate;
pub mod counting;
pub mod detector;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod glyphs;
pub mod handles;
pub mod metrics;
pub mod source;
pub mod stream;

pub use annotate::{annotate, caption};
pub use counting::{
    count_people, peak_count, CountBudget, CountSummary, StopReason, DEFAULT_FRAME_LIMIT,
};
pub use detector::{load_default_detector, HogParams, PersonDetector};
pub use error::{MediaError, MediaResult};
pub use ffmpeg::{find_ffmpeg, FfmpegOpener};
pub use frame::{Detection, Frame, FRAME_HEIGHT, FRAME_WIDTH};
pub use handles::{HandleLease, HandleTracker};
pub use source::{FrameSource, FrameSourceOpener, MemorySource, SourceInput};
pub use stream::{encode_jpeg, multipart_part, LiveStream, CONTENT_TYPE as MJPEG_CONTENT_TYPE};
