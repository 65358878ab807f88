//! V4L2 camera read through ffmpeg
//!
//! ffmpeg scales the device output to the requested resolution and writes
//! raw RGB24 frames to stdout. A reader task keeps the latest frame in a
//! shared slot. stderr is drained by its own task for the life of the
//! child, keeping only the last lines for error classification. The child
//! is spawned with `kill_on_drop(true)` and is also killed explicitly when
//! tracks are stopped.

use super::{
    MediaAccessError, MediaConstraints, MediaDevices, MediaStream, ReadyState, VideoFrame,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};
use uuid::Uuid;

/// Default wait for the first decoded frame
const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 5000;

/// stderr lines kept for classification
const STDERR_TAIL_LINES: usize = 20;

/// Wait for the stderr drain to catch up once stdout has closed
const STDERR_SETTLE_MS: u64 = 500;

/// ffmpeg-backed camera device
#[derive(Debug, Clone)]
pub struct FfmpegCamera {
    ffmpeg_bin: String,
    device: PathBuf,
    input_format: String,
    startup_timeout: Duration,
}

impl FfmpegCamera {
    /// Create a V4L2 camera for the given device path
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            device: device.into(),
            input_format: "v4l2".to_string(),
            startup_timeout: Duration::from_millis(DEFAULT_STARTUP_TIMEOUT_MS),
        }
    }

    pub fn with_ffmpeg_bin(mut self, bin: impl Into<String>) -> Self {
        self.ffmpeg_bin = bin.into();
        self
    }

    pub fn with_input_format(mut self, format: impl Into<String>) -> Self {
        self.input_format = format.into();
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    fn build_command(&self, width: u32, height: u32) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.arg("-f")
            .arg(&self.input_format)
            .arg("-i")
            .arg(&self.device)
            .arg("-vf")
            .arg(format!("scale={}:{}", width, height))
            .args([
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-loglevel",
                "error",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl MediaDevices for FfmpegCamera {
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, MediaAccessError> {
        let Some(video) = constraints.video.as_ref() else {
            return Err(MediaAccessError::other("A video track is required"));
        };

        // Permission / presence check before spawning anything
        if let Err(e) = tokio::fs::File::open(&self.device).await {
            tracing::warn!(device = %self.device.display(), error = %e, "Camera device unavailable");
            return Err(MediaAccessError::from_io(&e));
        }

        tracing::debug!(
            device = %self.device.display(),
            width = video.width,
            height = video.height,
            facing_mode = ?video.facing_mode,
            "Opening camera via ffmpeg"
        );

        let mut child = self
            .build_command(video.width, video.height)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaAccessError::Unsupported,
                _ => MediaAccessError::other(format!("ffmpeg spawn failed: {}", e)),
            })?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => return Err(MediaAccessError::other("ffmpeg pipes unavailable")),
        };

        let slot = Arc::new(FrameSlot::default());
        let tail = Arc::new(StderrTail::new(STDERR_TAIL_LINES));
        let drain = tokio::spawn(drain_stderr(stderr, Arc::clone(&tail)));
        let drain_abort = drain.abort_handle();

        let (ready_tx, ready_rx) = oneshot::channel();
        let reader = tokio::spawn(read_frames(
            stdout,
            drain,
            tail,
            video.width,
            video.height,
            Arc::clone(&slot),
            ready_tx,
        ));

        // Child is dropped (and killed) on every early return below
        match tokio::time::timeout(self.startup_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => {
                let stream = FfmpegStream {
                    id: Uuid::new_v4().to_string(),
                    width: video.width,
                    height: video.height,
                    slot,
                    child: Some(child),
                    reader: Some(reader),
                    drain: Some(drain_abort),
                };
                tracing::info!(stream_id = %stream.id, device = %self.device.display(), "Camera stream started");
                Ok(Box::new(stream))
            }
            Ok(Ok(Err(stderr))) => {
                tracing::warn!(device = %self.device.display(), stderr = %stderr, "ffmpeg exited before first frame");
                Err(MediaAccessError::from_message(&stderr))
            }
            Ok(Err(_)) => {
                reader.abort();
                drain_abort.abort();
                Err(MediaAccessError::other("Camera stream ended unexpectedly"))
            }
            Err(_) => {
                reader.abort();
                drain_abort.abort();
                tracing::warn!(
                    device = %self.device.display(),
                    timeout_ms = self.startup_timeout.as_millis() as u64,
                    "Camera produced no frame before timeout"
                );
                Err(MediaAccessError::other(format!(
                    "Camera did not deliver a frame within {}ms",
                    self.startup_timeout.as_millis()
                )))
            }
        }
    }
}

/// Latest decoded frame shared with the reader task
#[derive(Default)]
struct FrameSlot {
    frame: Mutex<Option<VideoFrame>>,
    ended: AtomicBool,
}

impl FrameSlot {
    fn store(&self, frame: VideoFrame) {
        let mut slot = self.frame.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(frame);
    }

    fn latest(&self) -> Option<VideoFrame> {
        self.frame.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn has_frame(&self) -> bool {
        self.frame.lock().unwrap_or_else(|p| p.into_inner()).is_some()
    }
}

/// Last lines written by ffmpeg on stderr
struct StderrTail {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl StderrTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(|p| p.into_inner());
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    fn text(&self) -> String {
        let lines = self.lines.lock().unwrap_or_else(|p| p.into_inner());
        lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Read stderr until the pipe closes so ffmpeg never blocks on it
async fn drain_stderr<R: AsyncRead + Unpin>(stderr: R, tail: Arc<StderrTail>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                tracing::debug!(stderr = %line, "ffmpeg");
                tail.push(line.to_string());
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "ffmpeg stderr closed");
                break;
            }
        }
    }
}

async fn read_frames<R: AsyncRead + Unpin>(
    stdout: R,
    mut drain: JoinHandle<()>,
    tail: Arc<StderrTail>,
    width: u32,
    height: u32,
    slot: Arc<FrameSlot>,
    ready_tx: oneshot::Sender<Result<(), String>>,
) {
    let frame_len = width as usize * height as usize * 3;
    let mut reader = BufReader::new(stdout);
    let mut buf = vec![0u8; frame_len];
    let mut ready_tx = Some(ready_tx);

    loop {
        match reader.read_exact(&mut buf).await {
            Ok(_) => {
                slot.store(VideoFrame::new(width, height, buf.clone()));
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            Err(e) => {
                if tokio::time::timeout(Duration::from_millis(STDERR_SETTLE_MS), &mut drain)
                    .await
                    .is_err()
                {
                    drain.abort();
                }
                let message = tail.text();

                match ready_tx.take() {
                    Some(tx) => {
                        let reason = if message.is_empty() { e.to_string() } else { message };
                        let _ = tx.send(Err(reason));
                    }
                    None => {
                        tracing::warn!(error = %e, stderr = %message, "Camera stream ended");
                    }
                }
                break;
            }
        }
    }

    slot.ended.store(true, Ordering::Relaxed);
}

/// Running ffmpeg capture
struct FfmpegStream {
    id: String,
    width: u32,
    height: u32,
    slot: Arc<FrameSlot>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    drain: Option<AbortHandle>,
}

impl MediaStream for FfmpegStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn ready_state(&self) -> ReadyState {
        match (self.slot.has_frame(), self.is_live()) {
            (true, true) => ReadyState::HaveEnoughData,
            (true, false) => ReadyState::HaveCurrentData,
            (false, _) => ReadyState::HaveMetadata,
        }
    }

    fn video_dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        self.slot.latest()
    }

    fn stop_tracks(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!(stream_id = %self.id, error = %e, "ffmpeg already exited");
            }
            tracing::debug!(stream_id = %self.id, "Camera tracks stopped");
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
        self.slot.ended.store(true, Ordering::Relaxed);
    }

    fn is_live(&self) -> bool {
        self.child.is_some() && !self.slot.ended.load(Ordering::Relaxed)
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}
