//! MediaCapture - Camera access adapters
//!
//! ## Responsibilities
//!
//! - Request a live video stream with resolution / facing constraints
//! - Classify denials and device failures
//! - Expose the current decoded frame of a live stream
//!
//! ## Adapters
//!
//! - `FfmpegCamera`: V4L2 device read through an ffmpeg child process
//! - `SyntheticCamera`: in-process test pattern (demo / tests)

pub mod ffmpeg;
pub mod synthetic;

pub use ffmpeg::FfmpegCamera;
pub use synthetic::{SyntheticBehavior, SyntheticCamera};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Nominal capture width requested from the device
pub const DEFAULT_WIDTH: u32 = 640;
/// Nominal capture height requested from the device
pub const DEFAULT_HEIGHT: u32 = 480;

/// Which camera to prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    Environment,
}

/// Video track constraints (ideal values)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
    pub facing_mode: FacingMode,
}

/// Stream request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub video: Option<VideoConstraints>,
    pub audio: bool,
}

impl MediaConstraints {
    /// Front-facing 640x480 video, no audio
    pub fn webcam() -> Self {
        Self {
            video: Some(VideoConstraints {
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
                facing_mode: FacingMode::User,
            }),
            audio: false,
        }
    }
}

/// How much media data a stream has decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

impl ReadyState {
    /// At least one frame decoded
    pub fn has_current_frame(&self) -> bool {
        *self >= ReadyState::HaveCurrentData
    }
}

/// Decoded RGB24 frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Expected byte length for the declared dimensions
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Camera access failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaAccessError {
    #[error("Camera access denied. Please allow camera permissions.")]
    PermissionDenied,

    #[error("No camera found. Please connect a camera.")]
    NotFound,

    #[error("Camera is being used by another application.")]
    Busy,

    #[error("Camera access is not supported on this system")]
    Unsupported,

    #[error("{0}")]
    Other(String),
}

impl MediaAccessError {
    /// Unclassified failure; blank messages get a generic hint
    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            MediaAccessError::Other("Please check permissions and try again.".to_string())
        } else {
            MediaAccessError::Other(message)
        }
    }

    /// Classify an OS error raised while opening the device
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => MediaAccessError::PermissionDenied,
            std::io::ErrorKind::NotFound => MediaAccessError::NotFound,
            _ if err.raw_os_error() == Some(16) => MediaAccessError::Busy, // EBUSY
            _ => MediaAccessError::other(err.to_string()),
        }
    }

    /// Classify a textual failure (e.g. capture tool stderr)
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("permission denied") || lower.contains("not allowed") {
            MediaAccessError::PermissionDenied
        } else if lower.contains("no such file")
            || lower.contains("no such device")
            || lower.contains("not found")
        {
            MediaAccessError::NotFound
        } else if lower.contains("device or resource busy") || lower.contains("in use") {
            MediaAccessError::Busy
        } else {
            MediaAccessError::other(message.trim())
        }
    }
}

/// A live video stream
pub trait MediaStream: Send {
    /// Stream identifier
    fn id(&self) -> &str;

    /// Decode progress of the attached surface
    fn ready_state(&self) -> ReadyState;

    /// Native resolution, if the device reports one
    fn video_dimensions(&self) -> Option<(u32, u32)>;

    /// Most recent decoded frame
    fn current_frame(&self) -> Option<VideoFrame>;

    /// Stop all tracks. Calling this on a stopped stream is a no-op.
    fn stop_tracks(&mut self);

    /// Whether tracks are still running
    fn is_live(&self) -> bool;
}

/// Source of live streams
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, MediaAccessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webcam_constraints() {
        let c = MediaConstraints::webcam();
        let video = c.video.unwrap();
        assert_eq!((video.width, video.height), (640, 480));
        assert_eq!(video.facing_mode, FacingMode::User);
        assert!(!c.audio);
    }

    #[test]
    fn test_ready_state_ordering() {
        assert!(!ReadyState::HaveMetadata.has_current_frame());
        assert!(ReadyState::HaveCurrentData.has_current_frame());
        assert!(ReadyState::HaveEnoughData.has_current_frame());
    }

    #[test]
    fn test_classify_io() {
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(MediaAccessError::from_io(&denied), MediaAccessError::PermissionDenied);

        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(MediaAccessError::from_io(&missing), MediaAccessError::NotFound);

        let busy = std::io::Error::from_raw_os_error(16);
        assert_eq!(MediaAccessError::from_io(&busy), MediaAccessError::Busy);
    }

    #[test]
    fn test_classify_message() {
        assert_eq!(
            MediaAccessError::from_message("/dev/video0: Device or resource busy"),
            MediaAccessError::Busy
        );
        assert_eq!(
            MediaAccessError::from_message("Cannot open video device /dev/video0: Permission denied"),
            MediaAccessError::PermissionDenied
        );
        assert_eq!(
            MediaAccessError::from_message("/dev/video9: No such file or directory"),
            MediaAccessError::NotFound
        );
        assert_eq!(
            MediaAccessError::from_message("   "),
            MediaAccessError::Other("Please check permissions and try again.".to_string())
        );
    }
}
