//! FFmpeg-backed frame sources.
//!
//! FFmpeg decodes any container, RTSP feed or capture device and writes
//! packed RGB24 frames at the working resolution to stdout. The child process
//! is the OS-level decoder resource: it is spawned with `kill_on_drop`, so
//! dropping the source kills it on every exit path.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::{Frame, FRAME_BYTES, FRAME_HEIGHT, FRAME_WIDTH};
use crate::handles::{HandleLease, HandleTracker};
use crate::source::{FrameSource, FrameSourceOpener, SourceInput};

/// Bytes of decoder stderr kept for error reports.
const STDERR_TAIL_BYTES: usize = 2048;

/// Default time allowed for the first frame to arrive.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(15);

/// Locate the ffmpeg binary.
pub fn find_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Build the ffmpeg argument list for an input.
pub fn ffmpeg_args(input: &SourceInput) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    match input {
        SourceInput::File(path) => {
            args.push("-i".into());
            args.push(path.to_string_lossy().into_owned());
        }
        SourceInput::Url(url) => {
            if url.starts_with("rtsp://") || url.starts_with("rtsps://") {
                args.extend(["-rtsp_transport".into(), "tcp".into()]);
            }
            args.push("-i".into());
            args.push(url.clone());
        }
        SourceInput::Device(index) => args.extend(device_args(*index)),
    }

    args.extend([
        "-an".into(),
        "-vf".into(),
        format!("scale={}:{}", FRAME_WIDTH, FRAME_HEIGHT),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-f".into(),
        "rawvideo".into(),
        "-".into(),
    ]);
    args
}

#[cfg(target_os = "macos")]
fn device_args(index: u32) -> Vec<String> {
    vec![
        "-f".into(),
        "avfoundation".into(),
        "-framerate".into(),
        "30".into(),
        "-i".into(),
        index.to_string(),
    ]
}

#[cfg(not(target_os = "macos"))]
fn device_args(index: u32) -> Vec<String> {
    vec![
        "-f".into(),
        "v4l2".into(),
        "-i".into(),
        format!("/dev/video{}", index),
    ]
}

/// Opens sources by spawning one ffmpeg process per call.
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    ffmpeg: PathBuf,
    tracker: HandleTracker,
    open_timeout: Duration,
}

impl FfmpegOpener {
    /// Create an opener, failing when ffmpeg is not installed.
    pub fn new(tracker: HandleTracker) -> MediaResult<Self> {
        let ffmpeg = find_ffmpeg()?;
        info!("Using ffmpeg at {}", ffmpeg.display());
        Ok(Self {
            ffmpeg,
            tracker,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        })
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }
}

#[async_trait]
impl FrameSourceOpener for FfmpegOpener {
    async fn open(&self, input: &SourceInput) -> MediaResult<Box<dyn FrameSource>> {
        let source =
            FfmpegFrameSource::spawn(&self.ffmpeg, input, &self.tracker, self.open_timeout).await?;
        Ok(Box::new(source))
    }
}

/// Frames decoded by a child ffmpeg process.
pub struct FfmpegFrameSource {
    // Field order matters: the lease is released after the child is killed.
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_tail: Arc<Mutex<String>>,
    stderr_task: Option<JoinHandle<()>>,
    pending: Option<Frame>,
    finished: bool,
    label: String,
    _lease: HandleLease,
}

impl FfmpegFrameSource {
    /// Spawn ffmpeg and wait for the first frame.
    pub async fn spawn(
        ffmpeg: &PathBuf,
        input: &SourceInput,
        tracker: &HandleTracker,
        open_timeout: Duration,
    ) -> MediaResult<Self> {
        let label = input.to_string();
        let args = ffmpeg_args(input);
        debug!(source = %label, "Spawning ffmpeg: {}", args.join(" "));

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                MediaError::source_open_failed(&label, format!("failed to spawn ffmpeg: {}", e))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| {
                MediaError::source_open_failed(&label, "failed to capture ffmpeg stdout")
            })?;

        let stderr_tail = Arc::new(Mutex::new(String::new()));
        let stderr_task = child.stderr.take().map(|stderr| {
            let tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Ok(mut buf) = tail.lock() {
                        buf.push_str(&line);
                        buf.push('\n');
                        if buf.len() > STDERR_TAIL_BYTES {
                            let mut cut = buf.len() - STDERR_TAIL_BYTES;
                            while !buf.is_char_boundary(cut) {
                                cut += 1;
                            }
                            buf.drain(..cut);
                        }
                    }
                }
            })
        });

        let mut source = Self {
            child,
            stdout: BufReader::with_capacity(FRAME_BYTES, stdout),
            stderr_tail,
            stderr_task,
            pending: None,
            finished: false,
            label: label.clone(),
            _lease: tracker.acquire(label.clone()),
        };

        match tokio::time::timeout(open_timeout, source.read_frame()).await {
            Ok(Ok(Some(frame))) => {
                info!(source = %label, "Video source opened");
                source.pending = Some(frame);
                Ok(source)
            }
            Ok(Ok(None)) => {
                let reason = source.failure_reason().await;
                Err(MediaError::source_open_failed(label, reason))
            }
            Ok(Err(e)) => Err(MediaError::source_open_failed(label, e.to_string())),
            Err(_) => Err(MediaError::source_open_failed(
                label,
                format!("no frame within {}s", open_timeout.as_secs()),
            )),
        }
    }

    /// Read one packed frame. A clean EOF on a frame boundary is end of stream.
    async fn read_frame(&mut self) -> MediaResult<Option<Frame>> {
        let mut buf = vec![0u8; FRAME_BYTES];
        let mut filled = 0;
        while filled < FRAME_BYTES {
            let n = self.stdout.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        match filled {
            0 => Ok(None),
            n if n < FRAME_BYTES => Err(MediaError::decode_failed(format!(
                "truncated frame ({} of {} bytes)",
                n, FRAME_BYTES
            ))),
            _ => Frame::from_rgb24(buf).map(Some),
        }
    }

    /// Best description of why the decoder produced nothing.
    async fn failure_reason(&mut self) -> String {
        let status = tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await;
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }
        let stderr = self
            .stderr_tail
            .lock()
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        match (stderr.is_empty(), status) {
            (false, _) => stderr,
            (true, Ok(Ok(status))) => {
                format!("decoder exited with {} before the first frame", status)
            }
            (true, _) => "decoder produced no frames".to_string(),
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        if self.finished {
            return Ok(None);
        }

        let result = self.read_frame().await;
        match &result {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.finished = true;
                debug!(source = %self.label, "Video source reached end of stream");
            }
            Err(e) => {
                self.finished = true;
                warn!(source = %self.label, "Video source failed: {}", e);
            }
        }
        result
    }

    fn describe(&self) -> &str {
        &self.label
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(source = %self.label, "ffmpeg already exited: {}", e);
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}
