//! Person detector adapter.
//!
//! The detector is an opaque capability: given a frame, return regions that
//! each contain one person. Implementations are immutable after construction
//! and are shared across requests behind an `Arc` without locking.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::MediaResult;
use crate::frame::{Detection, Frame};

/// Detects people in a single frame.
///
/// Calls are CPU-bound and synchronous; async callers run them on the
/// blocking pool.
pub trait PersonDetector: Send + Sync {
    /// Short name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Return one detection per person found in `frame`.
    fn detect(&self, frame: &Frame) -> MediaResult<Vec<Detection>>;
}

/// HOG sliding-window parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HogParams {
    pub win_stride: (i32, i32),
    pub padding: (i32, i32),
    /// Image pyramid scale step.
    pub scale: f64,
    pub hit_threshold: f64,
    /// Minimum overlapping windows to keep a detection.
    pub group_threshold: f64,
}

impl Default for HogParams {
    fn default() -> Self {
        Self {
            win_stride: (8, 8),
            padding: (4, 4),
            scale: 1.05,
            hit_threshold: 0.0,
            group_threshold: 2.0,
        }
    }
}

/// Build the detector available in this build, if any.
pub fn load_default_detector() -> Option<Arc<dyn PersonDetector>> {
    #[cfg(feature = "opencv")]
    {
        match hog::HogPeopleDetector::new(HogParams::default()) {
            Ok(detector) => {
                info!("Loaded OpenCV HOG people detector");
                return Some(Arc::new(detector));
            }
            Err(e) => {
                warn!("Failed to initialize HOG people detector: {}", e);
                return None;
            }
        }
    }

    #[cfg(not(feature = "opencv"))]
    {
        info!("Built without the `opencv` feature");
        warn!("No person detector available; analysis and live feeds are disabled");
        None
    }
}

#[cfg(feature = "opencv")]
pub use hog::HogPeopleDetector;

#[cfg(feature = "opencv")]
mod hog {
    use std::cell::RefCell;

    use opencv::core::{Mat, Rect, Size, Vector};
    use opencv::imgproc;
    use opencv::objdetect::HOGDescriptor;
    use opencv::prelude::*;

    use super::{HogParams, PersonDetector};
    use crate::error::{MediaError, MediaResult};
    use crate::frame::{Detection, Frame};

    type HogOutput = (Vector<Rect>, Vector<f64>);

    thread_local! {
        // One descriptor per blocking worker thread; never shared.
        static DESCRIPTOR: RefCell<Option<HOGDescriptor>> = const { RefCell::new(None) };
    }

    fn build_descriptor() -> opencv::Result<HOGDescriptor> {
        let mut hog = HOGDescriptor::default()?;
        hog.set_svm_detector(&HOGDescriptor::get_default_people_detector()?)?;
        Ok(hog)
    }

    fn cv_err(e: opencv::Error) -> MediaError {
        MediaError::detection_failed(e.to_string())
    }

    /// OpenCV HOG + linear SVM pedestrian detector.
    #[derive(Debug, Clone)]
    pub struct HogPeopleDetector {
        params: HogParams,
    }

    impl HogPeopleDetector {
        /// Create the detector, building one descriptor to fail fast.
        pub fn new(params: HogParams) -> MediaResult<Self> {
            build_descriptor().map_err(cv_err)?;
            Ok(Self { params })
        }

        fn to_bgr_mat(frame: &Frame) -> MediaResult<Mat> {
            let flat = Mat::from_slice(frame.as_raw()).map_err(cv_err)?;
            let rgb = flat.reshape(3, frame.height() as i32).map_err(cv_err)?;
            let mut bgr = Mat::default();
            imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0).map_err(cv_err)?;
            Ok(bgr)
        }
    }

    impl PersonDetector for HogPeopleDetector {
        fn name(&self) -> &'static str {
            "hog"
        }

        fn detect(&self, frame: &Frame) -> MediaResult<Vec<Detection>> {
            let mat = Self::to_bgr_mat(frame)?;
            let p = self.params;

            let (found, weights) = DESCRIPTOR.with(|cell| -> MediaResult<HogOutput> {
                let mut slot = cell.borrow_mut();
                if slot.is_none() {
                    *slot = Some(build_descriptor().map_err(cv_err)?);
                }
                let hog = slot
                    .as_ref()
                    .ok_or_else(|| MediaError::internal("HOG descriptor missing"))?;

                let mut found = Vector::<Rect>::new();
                let mut weights = Vector::<f64>::new();
                hog.detect_multi_scale_weights(
                    &mat,
                    &mut found,
                    &mut weights,
                    p.hit_threshold,
                    Size::new(p.win_stride.0, p.win_stride.1),
                    Size::new(p.padding.0, p.padding.1),
                    p.scale,
                    p.group_threshold,
                    false,
                )
                .map_err(cv_err)?;
                Ok((found, weights))
            })?;

            let detections = found
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    let weight = weights.get(i).unwrap_or(1.0);
                    Detection::new(r.x, r.y, r.width.max(0) as u32, r.height.max(0) as u32)
                        .with_weight(weight)
                })
                .collect();
            Ok(detections)
        }
    }
}
