//! Application state
//!
//! Holds configuration and the shared components

use crate::ai_client::{AiClient, AnalysisService};
use crate::capture_session::CaptureSession;
use crate::error::Result;
use crate::media_capture::{FfmpegCamera, MediaDevices, SyntheticCamera};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Hosted analysis service
pub const DEFAULT_API_URL: &str = "https://bad-posture-detection-gitx.onrender.com";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Posture analysis service base URL
    pub api_url: String,
    /// Analysis request timeout
    pub api_timeout_ms: u64,
    /// V4L2 capture device
    pub camera_device: PathBuf,
    /// ffmpeg executable
    pub ffmpeg_bin: String,
    /// ffmpeg input format for the capture device
    pub camera_input_format: String,
    /// Wait for the first decoded frame when the camera starts
    pub camera_startup_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: std::env::var("POSTURE_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            api_timeout_ms: std::env::var("POSTURE_API_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30_000),
            camera_device: std::env::var("POSTURE_CAMERA_DEVICE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/dev/video0")),
            ffmpeg_bin: std::env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string()),
            camera_input_format: std::env::var("POSTURE_CAMERA_FORMAT")
                .unwrap_or_else(|_| "v4l2".to_string()),
            camera_startup_ms: std::env::var("POSTURE_CAMERA_STARTUP_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5_000),
        }
    }
}

impl AppConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    pub fn camera_startup(&self) -> Duration {
        Duration::from_millis(self.camera_startup_ms)
    }

    /// Camera backend for this config
    pub fn media_devices(&self, synthetic: bool) -> Arc<dyn MediaDevices> {
        if synthetic {
            Arc::new(SyntheticCamera::default())
        } else {
            Arc::new(
                FfmpegCamera::new(self.camera_device.clone())
                    .with_ffmpeg_bin(self.ffmpeg_bin.clone())
                    .with_input_format(self.camera_input_format.clone())
                    .with_startup_timeout(self.camera_startup()),
            )
        }
    }
}

/// Application state shared by the CLI commands
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// AiClient (analysis service adapter)
    pub ai_client: Arc<AiClient>,
    /// CaptureSession (input + orchestrator)
    pub session: Arc<CaptureSession>,
}

impl AppState {
    /// Wire the components for `config`
    pub fn new(config: AppConfig, devices: Arc<dyn MediaDevices>) -> Result<Self> {
        let ai_client = Arc::new(AiClient::with_timeout(
            config.api_url.clone(),
            config.api_timeout(),
        )?);

        let service: Arc<dyn AnalysisService> = ai_client.clone();
        let session = Arc::new(CaptureSession::with_timeout(
            devices,
            service,
            config.api_timeout(),
        ));

        Ok(Self {
            config,
            ai_client,
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers() {
        let config = AppConfig {
            api_url: "http://localhost:8000".to_string(),
            api_timeout_ms: 1500,
            camera_device: PathBuf::from("/dev/video2"),
            ffmpeg_bin: "ffmpeg".to_string(),
            camera_input_format: "v4l2".to_string(),
            camera_startup_ms: 250,
        };
        assert_eq!(config.api_timeout(), Duration::from_millis(1500));
        assert_eq!(config.camera_startup(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_state_wiring() {
        let config = AppConfig {
            api_url: "http://localhost:8000/".to_string(),
            ..AppConfig::default()
        };
        let state = AppState::new(config.clone(), config.media_devices(true)).unwrap();
        assert_eq!(state.ai_client.base_url(), "http://localhost:8000");
        assert_eq!(state.ai_client.timeout(), config.api_timeout());
        assert!(state.session.snapshot().await.result.is_none());
    }
}
