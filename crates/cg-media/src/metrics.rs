//! Pipeline metrics.

use metrics::{counter, gauge, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Video source handles currently held open.
    pub const OPEN_SOURCES: &str = "crowdguard_open_sources";

    /// Live MJPEG streams currently being served.
    pub const LIVE_STREAMS_ACTIVE: &str = "crowdguard_live_streams_active";

    /// Frames encoded and sent to live consumers.
    pub const FRAMES_STREAMED_TOTAL: &str = "crowdguard_frames_streamed_total";

    /// Frames run through the detector during bounded analysis.
    pub const FRAMES_ANALYZED_TOTAL: &str = "crowdguard_frames_analyzed_total";

    /// Detector latency per frame in seconds.
    pub const DETECTION_SECONDS: &str = "crowdguard_detection_seconds";
}

pub(crate) fn set_open_sources(count: usize) {
    gauge!(names::OPEN_SOURCES).set(count as f64);
}

pub(crate) fn live_stream_started() {
    gauge!(names::LIVE_STREAMS_ACTIVE).increment(1.0);
}

pub(crate) fn live_stream_finished() {
    gauge!(names::LIVE_STREAMS_ACTIVE).decrement(1.0);
}

pub(crate) fn record_frame_streamed(mode: &str) {
    counter!(names::FRAMES_STREAMED_TOTAL, "mode" => mode.to_string()).increment(1);
}

pub(crate) fn record_frame_analyzed(detector: &str, seconds: f64) {
    counter!(names::FRAMES_ANALYZED_TOTAL, "detector" => detector.to_string()).increment(1);
    histogram!(names::DETECTION_SECONDS, "detector" => detector.to_string()).record(seconds);
}
