//! Frame source abstraction.
//!
//! A source yields frames lazily. `Ok(None)` is the benign end of stream;
//! `Err(MediaError::DecodeFailed)` reports a corrupt frame. Opening a source
//! that cannot produce any frame fails with `SourceOpenFailed` so callers can
//! tell an unreachable camera from an empty scene.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use cg_models::CameraSource;

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::handles::{HandleLease, HandleTracker};

/// What to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInput {
    /// A finite container on disk (e.g. a spooled upload).
    File(PathBuf),
    /// A network stream (RTSP, RTMP, HTTP).
    Url(String),
    /// A local capture device index.
    Device(u32),
}

impl fmt::Display for SourceInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceInput::File(path) => write!(f, "file:{}", path.display()),
            SourceInput::Url(url) => write!(f, "{}", url),
            SourceInput::Device(index) => write!(f, "device:{}", index),
        }
    }
}

impl From<CameraSource> for SourceInput {
    fn from(source: CameraSource) -> Self {
        match source {
            CameraSource::Device(index) => SourceInput::Device(index),
            CameraSource::Url(url) => SourceInput::Url(url),
        }
    }
}

/// A lazy sequence of frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Pull the next frame.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;

    /// Human-readable source name for logs.
    fn describe(&self) -> &str;
}

/// Opens frame sources. Each call yields an independent source.
#[async_trait]
pub trait FrameSourceOpener: Send + Sync {
    async fn open(&self, input: &SourceInput) -> MediaResult<Box<dyn FrameSource>>;
}

/// What a [`MemorySource`] does once its frames run out.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Tail {
    End,
    Repeat,
    Fail(String),
}

/// In-memory frame source for synthetic clips.
pub struct MemorySource {
    frames: Vec<Frame>,
    cursor: usize,
    tail: Tail,
    label: String,
    _lease: Option<HandleLease>,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            cursor: 0,
            tail: Tail::End,
            label: "memory".to_string(),
            _lease: None,
        }
    }

    /// Cycle through the frames forever, like a live camera.
    pub fn repeating(mut self) -> Self {
        self.tail = Tail::Repeat;
        self
    }

    /// Report a decode failure after the last frame.
    pub fn then_fail(mut self, reason: impl Into<String>) -> Self {
        self.tail = Tail::Fail(reason.into());
        self
    }

    /// Hold a handle lease from `tracker` while this source lives.
    pub fn tracked(mut self, tracker: &HandleTracker) -> Self {
        self._lease = Some(tracker.acquire(self.label.clone()));
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.cursor >= self.frames.len() {
            match &self.tail {
                Tail::End => return Ok(None),
                Tail::Fail(reason) => return Err(MediaError::decode_failed(reason.clone())),
                Tail::Repeat if self.frames.is_empty() => return Ok(None),
                Tail::Repeat => self.cursor = 0,
            }
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn describe(&self) -> &str {
        &self.label
    }
}
