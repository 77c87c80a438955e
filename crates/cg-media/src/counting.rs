//! Bounded crowd counting.
//!
//! The count for a clip is the largest number of people seen in any single
//! frame. Taking the peak rather than a sum avoids counting the same people
//! again in consecutive frames; it is a per-frame snapshot, not a unique
//! head count. A run that detects nobody reports a true zero.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::detector::PersonDetector;
use crate::error::{MediaError, MediaResult};
use crate::frame::{Detection, Frame};
use crate::metrics;
use crate::source::FrameSource;

/// Frames examined per uploaded clip unless configured otherwise.
pub const DEFAULT_FRAME_LIMIT: u32 = 20;

/// Limits for one bounded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountBudget {
    pub max_frames: u32,
    pub max_duration: Option<Duration>,
}

impl Default for CountBudget {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_FRAME_LIMIT,
            max_duration: None,
        }
    }
}

impl CountBudget {
    pub fn frames(max_frames: u32) -> Self {
        Self {
            max_frames,
            max_duration: None,
        }
    }

    pub fn with_max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }
}

/// Why a bounded run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    FrameLimit,
    Exhausted,
    TimeBudget,
    DecodeFailed(String),
    DetectorFailed(String),
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::FrameLimit => "frame_limit",
            StopReason::Exhausted => "exhausted",
            StopReason::TimeBudget => "time_budget",
            StopReason::DecodeFailed(_) => "decode_failed",
            StopReason::DetectorFailed(_) => "detector_failed",
        }
    }
}

/// Outcome of a bounded run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountSummary {
    /// Peak detections in a single frame.
    pub peak: u32,
    pub frames_processed: u32,
    pub stopped: StopReason,
}

/// Running peak over per-frame counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountAccumulator {
    peak: u32,
    frames: u32,
}

impl CountAccumulator {
    /// Fold in one frame's count and return the new peak.
    pub fn observe(&mut self, count: u32) -> u32 {
        self.frames += 1;
        self.peak = self.peak.max(count);
        self.peak
    }

    pub fn peak(&self) -> u32 {
        self.peak
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }
}

/// Peak of the first `limit` samples.
pub fn peak_count<I>(samples: I, limit: u32) -> u32
where
    I: IntoIterator<Item = u32>,
{
    let mut acc = CountAccumulator::default();
    for count in samples.into_iter().take(limit as usize) {
        acc.observe(count);
    }
    acc.peak()
}

/// Run the detector on the blocking pool, handing the frame back.
pub async fn detect_frame(
    detector: Arc<dyn PersonDetector>,
    frame: Frame,
) -> MediaResult<(Frame, Vec<Detection>)> {
    tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        let detections = detector.detect(&frame)?;
        metrics::record_frame_analyzed(detector.name(), started.elapsed().as_secs_f64());
        Ok((frame, detections))
    })
    .await
    .map_err(|e| MediaError::internal(format!("detector task failed: {}", e)))?
}

/// Count people over at most `budget.max_frames` frames of `source`.
///
/// Frames are processed strictly in source order. Decode and detector errors
/// end the run and the peak so far is returned with the reason.
pub async fn count_people(
    source: &mut dyn FrameSource,
    detector: Arc<dyn PersonDetector>,
    budget: CountBudget,
) -> CountSummary {
    let started = Instant::now();
    let deadline = budget.max_duration.map(|d| tokio::time::Instant::now() + d);
    let mut acc = CountAccumulator::default();

    let stopped = loop {
        if acc.frames() >= budget.max_frames {
            break StopReason::FrameLimit;
        }

        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, source.next_frame()).await {
                Ok(next) => next,
                Err(_) => break StopReason::TimeBudget,
            },
            None => source.next_frame().await,
        };

        let frame = match next {
            Ok(Some(frame)) => frame,
            Ok(None) => break StopReason::Exhausted,
            Err(e) => {
                warn!(
                    source = %source.describe(),
                    "Treating decode failure as end of stream: {}", e
                );
                break StopReason::DecodeFailed(e.to_string());
            }
        };

        match detect_frame(Arc::clone(&detector), frame).await {
            Ok((_, detections)) => {
                let count = detections.len() as u32;
                let peak = acc.observe(count);
                debug!(frame = acc.frames(), count, peak, "Frame counted");
            }
            Err(e) => {
                warn!(source = %source.describe(), "Detector failed, stopping count: {}", e);
                break StopReason::DetectorFailed(e.to_string());
            }
        }

        if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
            break StopReason::TimeBudget;
        }
    };

    info!(
        source = %source.describe(),
        peak = acc.peak(),
        frames = acc.frames(),
        stopped = stopped.as_str(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Bounded count finished"
    );

    CountSummary {
        peak: acc.peak(),
        frames_processed: acc.frames(),
        stopped,
    }
}
