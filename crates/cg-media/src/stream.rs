//! MJPEG live streaming.
//!
//! Each frame is pulled, analyzed, annotated and JPEG-encoded only when the
//! consumer asks for the next part. Dropping the stream drops the frame
//! source with it, which releases the decoder handle.

use std::sync::Arc;

use futures_util::stream::{self, Stream};
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use cg_models::DetectionMode;

use crate::annotate::annotate;
use crate::detector::PersonDetector;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::metrics;
use crate::source::FrameSource;

/// Multipart boundary token.
pub const BOUNDARY: &str = "frame";

/// Content type of the live feed response.
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Encode a frame as baseline JPEG.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> MediaResult<Vec<u8>> {
    let mut out = Vec::with_capacity(64 * 1024);
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        ColorType::Rgb8,
    )?;
    Ok(out)
}

/// Wrap one JPEG image as a multipart part.
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// An annotated live feed over one frame source.
pub struct LiveStream {
    source: Box<dyn FrameSource>,
    detector: Arc<dyn PersonDetector>,
    mode: DetectionMode,
    quality: u8,
    counts: Option<watch::Sender<u32>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl LiveStream {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Arc<dyn PersonDetector>,
        mode: DetectionMode,
    ) -> Self {
        Self {
            source,
            detector,
            mode,
            quality: DEFAULT_JPEG_QUALITY,
            counts: None,
            shutdown: None,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Publish each frame's person count to `sender`.
    pub fn with_count_observer(mut self, sender: watch::Sender<u32>) -> Self {
        self.counts = Some(sender);
        self
    }

    /// End the feed once `shutdown` turns true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Turn the feed into a stream of multipart parts.
    ///
    /// A decode failure or the end of the source ends the stream cleanly.
    /// Detector and encoder failures are yielded once, then the stream ends.
    pub fn into_stream(self) -> impl Stream<Item = MediaResult<Vec<u8>>> + Send + 'static {
        let state = StreamState {
            guard: ActiveStreamGuard::new(self.source.describe().to_string(), self.mode),
            live: self,
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }

            let next = match state.live.shutdown.as_mut() {
                Some(shutdown) => {
                    if *shutdown.borrow() {
                        return None;
                    }
                    tokio::select! {
                        biased;
                        _ = shutdown_requested(shutdown) => {
                            debug!(
                                source = %state.guard.source,
                                "Live stream stopped for shutdown"
                            );
                            return None;
                        }
                        next = state.live.source.next_frame() => next,
                    }
                }
                None => state.live.source.next_frame().await,
            };

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!(source = %state.guard.source, "Live source ended");
                    return None;
                }
                Err(MediaError::DecodeFailed(reason)) => {
                    warn!(
                        source = %state.guard.source,
                        "Live decode failed, ending stream: {}", reason
                    );
                    return None;
                }
                Err(e) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
            };

            let detector = Arc::clone(&state.live.detector);
            match render(detector, frame, state.live.mode, state.live.quality).await {
                Ok((part, count)) => {
                    state.guard.frames += 1;
                    metrics::record_frame_streamed(state.live.mode.as_str());
                    if let Some(counts) = &state.live.counts {
                        counts.send_replace(count);
                    }
                    Some((Ok(part), state))
                }
                Err(e) => {
                    warn!(source = %state.guard.source, "Live frame failed: {}", e);
                    state.finished = true;
                    Some((Err(e), state))
                }
            }
        })
    }
}

/// Resolves when shutdown is signalled. A dropped sender never signals.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

struct StreamState {
    live: LiveStream,
    guard: ActiveStreamGuard,
    finished: bool,
}

/// Detect, annotate and encode on the blocking pool.
async fn render(
    detector: Arc<dyn PersonDetector>,
    frame: Frame,
    mode: DetectionMode,
    quality: u8,
) -> MediaResult<(Vec<u8>, u32)> {
    tokio::task::spawn_blocking(move || {
        let detections = detector.detect(&frame)?;
        let count = detections.len() as u32;
        let annotated = annotate(frame, &detections, mode);
        let jpeg = encode_jpeg(&annotated, quality)?;
        Ok((multipart_part(&jpeg), count))
    })
    .await
    .map_err(|e| MediaError::internal(format!("render task failed: {}", e)))?
}

/// Tracks one active stream for metrics and logs its lifetime.
struct ActiveStreamGuard {
    source: String,
    mode: DetectionMode,
    frames: u64,
}

impl ActiveStreamGuard {
    fn new(source: String, mode: DetectionMode) -> Self {
        metrics::live_stream_started();
        info!(source = %source, mode = mode.as_str(), "Live stream started");
        Self {
            source,
            mode,
            frames: 0,
        }
    }
}

impl Drop for ActiveStreamGuard {
    fn drop(&mut self) {
        metrics::live_stream_finished();
        info!(
            source = %self.source,
            mode = self.mode.as_str(),
            frames = self.frames,
            "Live stream closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Detection;
    use crate::handles::HandleTracker;
    use crate::source::MemorySource;
    use futures_util::StreamExt;

    struct FixedDetector(usize);

    impl PersonDetector for FixedDetector {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&self, _frame: &Frame) -> MediaResult<Vec<Detection>> {
            Ok((0..self.0 as i32).map(|i| Detection::new(40 + i * 60, 120, 40, 100)).collect())
        }
    }

    #[test]
    fn test_multipart_part_layout() {
        let part = multipart_part(b"JPEG");
        assert_eq!(
            part,
            b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\nJPEG\r\n".to_vec()
        );
    }

    #[test]
    fn test_encode_jpeg_has_soi_marker() {
        let jpeg = encode_jpeg(&Frame::solid([10, 20, 30]), 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_stream_yields_parts_and_counts() {
        let source = MemorySource::new(vec![Frame::solid([0, 0, 0]); 3]);
        let (tx, rx) = watch::channel(0);
        let stream = LiveStream::new(
            Box::new(source),
            Arc::new(FixedDetector(2)),
            DetectionMode::Object,
        )
        .with_count_observer(tx)
        .into_stream();

        let parts: Vec<_> = stream.collect().await;
        assert_eq!(parts.len(), 3);
        for part in parts {
            let part = part.unwrap();
            assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n"));
            assert!(part.ends_with(b"\r\n"));
        }
        assert_eq!(*rx.borrow(), 2);
    }

    #[tokio::test]
    async fn test_decode_failure_ends_stream() {
        let source = MemorySource::new(vec![Frame::solid([0, 0, 0])]).then_fail("bad packet");
        let stream = LiveStream::new(
            Box::new(source),
            Arc::new(FixedDetector(0)),
            DetectionMode::Thermal,
        )
        .into_stream();
        let parts: Vec<_> = stream.collect().await;
        assert_eq!(parts.len(), 1);
        assert!(parts[0].is_ok());
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_source_handle() {
        let tracker = HandleTracker::new();
        let source = MemorySource::new(vec![Frame::solid([0, 0, 0])])
            .repeating()
            .tracked(&tracker);
        let stream = LiveStream::new(
            Box::new(source),
            Arc::new(FixedDetector(1)),
            DetectionMode::Object,
        )
        .into_stream();
        let mut stream = Box::pin(stream);

        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_some());
        assert_eq!(tracker.open_handles(), 1);

        drop(stream);
        assert_eq!(tracker.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_ends_endless_feed() {
        let tracker = HandleTracker::new();
        let source = MemorySource::new(vec![Frame::solid([0, 0, 0])])
            .repeating()
            .tracked(&tracker);
        let (stop, shutdown) = watch::channel(false);
        let mut stream = Box::pin(
            LiveStream::new(Box::new(source), Arc::new(FixedDetector(1)), DetectionMode::Object)
                .with_shutdown(shutdown)
                .into_stream(),
        );

        assert!(stream.next().await.is_some());
        stop.send(true).unwrap();
        assert!(stream.next().await.is_none());

        drop(stream);
        assert_eq!(tracker.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_keeps_feed_running() {
        let source = MemorySource::new(vec![Frame::solid([0, 0, 0])]).repeating();
        let (stop, shutdown) = watch::channel(false);
        drop(stop);
        let mut stream = Box::pin(
            LiveStream::new(Box::new(source), Arc::new(FixedDetector(1)), DetectionMode::Object)
                .with_shutdown(shutdown)
                .into_stream(),
        );

        for _ in 0..3 {
            assert!(stream.next().await.unwrap().is_ok());
        }
    }
}
