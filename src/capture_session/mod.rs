//! CaptureSession - Intent Facade
//!
//! ## Responsibilities
//!
//! - Accept the user intents (select file, clear file, toggle camera,
//!   capture, analyze, change mode)
//! - Route them through InputSourceManager / FrameCapture / AnalysisOrchestrator
//! - Surface every failure into the shared TransientError slot
//! - Expose the observable state as a serializable snapshot
//!
//! The session is the single source of truth; presentation layers
//! subscribe to the RealtimeHub and re-read `snapshot()`.

use crate::ai_client::{AnalysisService, DEFAULT_TIMEOUT_MS};
use crate::analysis_orchestrator::{AnalysisOrchestrator, ModeChange, RequestState};
use crate::error::{Error, Result};
use crate::frame_capture::{self, CaptureError};
use crate::input_source::{FileInfo, InputSourceKind, InputSourceManager, Transition};
use crate::media_capture::MediaDevices;
use crate::models::{AnalysisMode, AnalysisResult, InputBlob};
use crate::preview_registry::PreviewRegistry;
use crate::realtime_hub::{HubMessage, InputChangedMessage, RealtimeHub};
use crate::transient_error::{TransientError, TransientErrorSlot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Live camera details for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub stream_id: String,
    pub ready: bool,
    pub dimensions: Option<(u32, u32)>,
}

/// Observable session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub input_kind: InputSourceKind,
    pub file: Option<FileInfo>,
    pub camera: Option<CameraInfo>,
    pub effective_mode: AnalysisMode,
    pub pending_mode: Option<AnalysisMode>,
    pub request: RequestState,
    pub result: Option<AnalysisResult>,
    pub error: Option<TransientError>,
}

/// CaptureSession instance
pub struct CaptureSession {
    inputs: Mutex<InputSourceManager>,
    orchestrator: AnalysisOrchestrator,
    errors: Arc<TransientErrorSlot>,
    previews: Arc<PreviewRegistry>,
    hub: Arc<RealtimeHub>,
}

impl CaptureSession {
    /// Create new session (30s request bound)
    pub fn new(devices: Arc<dyn MediaDevices>, service: Arc<dyn AnalysisService>) -> Self {
        Self::with_timeout(devices, service, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    /// Create new session with a custom request bound
    pub fn with_timeout(
        devices: Arc<dyn MediaDevices>,
        service: Arc<dyn AnalysisService>,
        request_timeout: Duration,
    ) -> Self {
        let previews = PreviewRegistry::new();
        let errors = Arc::new(TransientErrorSlot::new());
        let hub = Arc::new(RealtimeHub::new());

        let orchestrator = AnalysisOrchestrator::new(service, errors.clone(), hub.clone())
            .with_request_timeout(request_timeout);

        Self {
            inputs: Mutex::new(InputSourceManager::new(devices, previews.clone())),
            orchestrator,
            errors,
            previews,
            hub,
        }
    }

    /// Subscribe to state change notifications
    pub async fn subscribe(
        &self,
        name: impl Into<String>,
    ) -> (Uuid, mpsc::UnboundedReceiver<HubMessage>) {
        self.hub.register(name).await
    }

    pub fn hub(&self) -> &Arc<RealtimeHub> {
        &self.hub
    }

    pub fn previews(&self) -> &Arc<PreviewRegistry> {
        &self.previews
    }

    // ========================================================================
    // Intents
    // ========================================================================

    /// Select an uploaded file, replacing the current input
    pub async fn select_file(&self, blob: Option<InputBlob>) -> Result<FileInfo> {
        self.clear_error().await;
        self.orchestrator.clear_result().await;

        let outcome = {
            let mut inputs = self.inputs.lock().await;
            let previous = inputs.kind();
            let outcome = inputs.select_file(blob);
            let info = inputs.selected_file().map(|f| f.info());
            (outcome, previous, inputs.kind(), info)
        };

        match outcome {
            (Ok(transition), _, _, info) => {
                self.notify_input(transition, info.clone()).await;
                info.ok_or_else(|| Error::Internal("selection missing after select".to_string()))
            }
            (Err(e), previous, current, _) => {
                self.notify_input(Transition { previous, current }, None).await;
                Err(self.fail(e).await)
            }
        }
    }

    /// Drop the selected file (no-op without one)
    pub async fn clear_file(&self) -> bool {
        let transition = self.inputs.lock().await.clear_file();
        if transition.changed() {
            self.clear_error().await;
        }
        self.notify_input(transition, None).await;
        transition.changed()
    }

    /// Start the camera if stopped, stop it if live
    pub async fn toggle_camera(&self) -> Result<InputSourceKind> {
        let live = self.inputs.lock().await.has_stream();
        if live {
            self.stop_camera().await;
        } else {
            self.start_camera().await?;
        }
        Ok(self.inputs.lock().await.kind())
    }

    /// Start the live camera, dropping any selected file
    pub async fn start_camera(&self) -> Result<()> {
        self.clear_error().await;

        let mut inputs = self.inputs.lock().await;
        if inputs.has_stream() {
            return Ok(());
        }

        if inputs.kind() == InputSourceKind::UploadedFile {
            let transition = inputs.clear_file();
            self.notify_input(transition, None).await;
            self.orchestrator.clear_result().await;
        }

        let outcome = inputs.start_camera().await;
        drop(inputs);

        match outcome {
            Ok(transition) => {
                self.notify_input(transition, None).await;
                Ok(())
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Stop the live camera. Returns false if none was running.
    pub async fn stop_camera(&self) -> bool {
        let transition = self.inputs.lock().await.stop_camera();
        if !transition.changed() {
            return false;
        }

        self.notify_input(transition, None).await;
        self.clear_error().await;
        self.orchestrator.clear_result().await;
        true
    }

    /// Grab the current camera frame and analyze it
    ///
    /// Silent no-op (`Ok(None)`) while a request is in flight.
    pub async fn capture_and_analyze(&self) -> Result<Option<AnalysisResult>> {
        if self.orchestrator.is_in_flight().await {
            tracing::debug!("Capture ignored, request in flight");
            return Ok(None);
        }

        let captured = {
            let inputs = self.inputs.lock().await;
            match inputs.active_stream() {
                Some(stream) => frame_capture::capture_frame(stream),
                None => Err(CaptureError::NoStream),
            }
        };

        match captured {
            Ok(frame) => {
                tracing::debug!(size = frame.size(), "Frame captured");
                self.orchestrator.submit(&frame).await
            }
            Err(e) => Err(self.fail(Error::Capture(e)).await),
        }
    }

    /// Analyze the selected file
    ///
    /// Silent no-op (`Ok(None)`) while a request is in flight.
    pub async fn submit_analysis(&self) -> Result<Option<AnalysisResult>> {
        if self.orchestrator.is_in_flight().await {
            tracing::debug!("Submit ignored, request in flight");
            return Ok(None);
        }

        let blob = self
            .inputs
            .lock()
            .await
            .selected_file()
            .map(|f| f.blob.clone());

        match blob {
            Some(blob) => self.orchestrator.submit(&blob).await,
            None => Err(self.fail(Error::NoInput).await),
        }
    }

    /// Change the analysis mode (deferred while in flight)
    pub async fn change_mode(&self, mode: AnalysisMode) -> ModeChange {
        self.clear_error().await;
        self.orchestrator.change_mode(mode).await
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Current observable state
    pub async fn snapshot(&self) -> SessionSnapshot {
        let (input_kind, file, camera) = {
            let inputs = self.inputs.lock().await;
            let camera = inputs.active_stream().map(|s| CameraInfo {
                stream_id: s.id().to_string(),
                ready: s.ready_state().has_current_frame(),
                dimensions: s.video_dimensions(),
            });
            (
                inputs.kind(),
                inputs.selected_file().map(|f| f.info()),
                camera,
            )
        };

        SessionSnapshot {
            input_kind,
            file,
            camera,
            effective_mode: self.orchestrator.effective_mode().await,
            pending_mode: self.orchestrator.pending_mode().await,
            request: self.orchestrator.request_state().await,
            result: self.orchestrator.result().await,
            error: self.errors.current(),
        }
    }

    pub fn current_error(&self) -> Option<TransientError> {
        self.errors.current()
    }

    /// Drop the surfaced error once it has expired
    pub async fn check_error_expiration(&self) -> bool {
        let expired = self.errors.check_expiration();
        if expired {
            self.hub.broadcast(HubMessage::ErrorCleared).await;
        }
        expired
    }

    /// Release the camera and any preview
    pub async fn teardown(&self) {
        let transition = self.inputs.lock().await.teardown();
        self.notify_input(transition, None).await;
        tracing::info!(
            previews_live = self.previews.live_count(),
            "Capture session torn down"
        );
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn fail(&self, err: Error) -> Error {
        let error = self.errors.raise_error(&err);
        self.hub.broadcast(HubMessage::ErrorRaised(error)).await;
        err
    }

    async fn clear_error(&self) {
        if self.errors.clear() {
            self.hub.broadcast(HubMessage::ErrorCleared).await;
        }
    }

    async fn notify_input(&self, transition: Transition, file: Option<FileInfo>) {
        if !transition.changed() && transition.current != InputSourceKind::UploadedFile {
            return;
        }
        self.hub
            .broadcast(HubMessage::InputChanged(InputChangedMessage {
                kind: transition.current,
                file,
            }))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_client::AnalysisError;
    use crate::analysis_orchestrator::tests::GatedService;
    use crate::media_capture::{MediaAccessError, SyntheticBehavior, SyntheticCamera};
    use std::sync::atomic::Ordering;

    fn setup(gated: bool) -> (Arc<CaptureSession>, Arc<SyntheticCamera>, Arc<GatedService>) {
        let camera = Arc::new(SyntheticCamera::default());
        let service = Arc::new(GatedService::new(gated));
        let session = Arc::new(CaptureSession::new(camera.clone(), service.clone()));
        (session, camera, service)
    }

    fn jpeg(size: usize) -> InputBlob {
        InputBlob::new("pose.jpg", "image/jpeg", vec![3u8; size])
    }

    #[tokio::test]
    async fn test_file_analysis_scenario() {
        let (session, _, _) = setup(false);
        let info = session.select_file(Some(jpeg(2048))).await.unwrap();
        assert_eq!(info.size, 2048);
        assert!(info.preview_url.is_some());

        session.submit_analysis().await.unwrap();

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.request, RequestState::Idle);
        let result = snapshot.result.unwrap();
        assert!(result.has_bad_posture);
        assert_eq!(result.issues, vec!["knee valgus".to_string()]);
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn test_oversized_file_rejected() {
        let (session, _, service) = setup(false);
        let big = InputBlob::new("big.mp4", "video/mp4", vec![0u8; 60 * 1024 * 1024]);

        let err = session.select_file(Some(big)).await.unwrap_err();
        assert!(err.user_message().contains("50MB"));

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.input_kind, InputSourceKind::None);
        assert!(snapshot.error.unwrap().message.contains("50MB"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_camera_denied() {
        let (session, camera, _) = setup(false);
        camera.set_behavior(SyntheticBehavior::Deny(MediaAccessError::PermissionDenied));

        assert!(session.start_camera().await.is_err());

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.input_kind, InputSourceKind::None);
        let error = snapshot.error.unwrap();
        assert!(error.message.contains("denied"));
        assert!(error.message.starts_with("Webcam error: "));
    }

    #[tokio::test]
    async fn test_camera_capture_and_analyze() {
        let (session, camera, service) = setup(false);
        session.toggle_camera().await.unwrap();
        assert_eq!(session.snapshot().await.input_kind, InputSourceKind::LiveCamera);

        let result = session.capture_and_analyze().await.unwrap();
        assert!(result.is_some());
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);

        assert_eq!(session.toggle_camera().await.unwrap(), InputSourceKind::None);
        assert_eq!(camera.live_count(), 0);
        // stopping the camera drops the verdict
        assert!(session.snapshot().await.result.is_none());
    }

    #[tokio::test]
    async fn test_capture_without_camera() {
        let (session, _, service) = setup(false);
        let err = session.capture_and_analyze().await.unwrap_err();
        assert_eq!(err.user_message(), "Webcam not initialized");
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_capture_not_ready() {
        let (session, camera, _) = setup(false);
        camera.set_behavior(SyntheticBehavior::NeverReady);
        session.start_camera().await.unwrap();

        let err = session.capture_and_analyze().await.unwrap_err();
        assert_eq!(
            err.user_message(),
            "Webcam not ready. Please wait for video to load."
        );
        assert_eq!(session.current_error().unwrap().code, "CAPTURE_ERROR");
    }

    #[tokio::test]
    async fn test_submit_without_file() {
        let (session, _, _) = setup(false);
        let err = session.submit_analysis().await.unwrap_err();
        assert_eq!(err.user_message(), "Please select a file first");
    }

    #[tokio::test]
    async fn test_second_submit_is_silent() {
        let (session, _, service) = setup(true);
        session.select_file(Some(jpeg(100))).await.unwrap();

        let task = {
            let session = session.clone();
            tokio::spawn(async move { session.submit_analysis().await })
        };
        service.started.notified().await;

        assert!(session.submit_analysis().await.unwrap().is_none());
        assert!(session.capture_and_analyze().await.unwrap().is_none());
        assert!(session.current_error().is_none());
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);

        service.release.notify_one();
        assert!(task.await.unwrap().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_deferred_mode_keeps_result() {
        let (session, _, service) = setup(true);
        session.select_file(Some(jpeg(100))).await.unwrap();

        let task = {
            let session = session.clone();
            tokio::spawn(async move { session.submit_analysis().await })
        };
        service.started.notified().await;

        assert_eq!(session.change_mode(AnalysisMode::Sitting).await, ModeChange::Deferred);
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.effective_mode, AnalysisMode::Squat);
        assert_eq!(snapshot.pending_mode, Some(AnalysisMode::Sitting));

        service.release.notify_one();
        task.await.unwrap().unwrap();

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.effective_mode, AnalysisMode::Sitting);
        assert!(snapshot.result.is_some());

        session.change_mode(AnalysisMode::Squat).await;
        assert!(session.snapshot().await.result.is_none());
    }

    #[tokio::test]
    async fn test_service_failure_surfaces() {
        let (session, _, service) = setup(false);
        service.fail_with(AnalysisError::ServerRejected {
            status: 400,
            message: "No pose detected. Ensure a person is visible.".to_string(),
        });
        session.select_file(Some(jpeg(100))).await.unwrap();

        assert!(session.submit_analysis().await.is_err());
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.request, RequestState::Idle);
        assert_eq!(
            snapshot.error.unwrap().message,
            "Analysis failed: No pose detected. Ensure a person is visible."
        );
    }

    #[tokio::test]
    async fn test_stop_and_clear_noops() {
        let (session, _, _) = setup(false);
        let before = session.snapshot().await;

        assert!(!session.stop_camera().await);
        assert!(!session.clear_file().await);

        assert_eq!(session.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_mode_change_clears_error() {
        let (session, _, _) = setup(false);
        let notes = InputBlob::new("notes.txt", "text/plain", vec![1u8; 10]);
        session.select_file(Some(notes)).await.unwrap_err();
        assert!(session.current_error().is_some());

        session.change_mode(AnalysisMode::Sitting).await;
        assert!(session.current_error().is_none());
    }

    #[tokio::test]
    async fn test_clear_file_clears_error() {
        let (session, _, service) = setup(false);
        service.fail_with(AnalysisError::NoResponse);
        session.select_file(Some(jpeg(10))).await.unwrap();
        session.submit_analysis().await.unwrap_err();
        assert_eq!(session.current_error().unwrap().code, "NETWORK_ERROR");

        assert!(session.clear_file().await);
        assert!(session.current_error().is_none());

        // nothing left to clear, the new error stays
        session.submit_analysis().await.unwrap_err();
        assert!(!session.clear_file().await);
        assert_eq!(session.current_error().unwrap().code, "NO_INPUT");
    }

    #[tokio::test]
    async fn test_switching_sources_releases() {
        let (session, camera, _) = setup(false);
        session.select_file(Some(jpeg(10))).await.unwrap();
        session.start_camera().await.unwrap();
        assert_eq!(session.previews().live_count(), 0);

        session.select_file(Some(jpeg(10))).await.unwrap();
        assert_eq!(camera.live_count(), 0);
        assert_eq!(session.previews().live_count(), 1);

        session.teardown().await;
        assert_eq!(session.previews().live_count(), 0);
        assert_eq!(session.snapshot().await.input_kind, InputSourceKind::None);
    }

    #[tokio::test]
    async fn test_notifications() {
        let (session, _, _) = setup(false);
        let (_, mut rx) = session.subscribe("test").await;

        session.select_file(Some(jpeg(10))).await.unwrap();
        session.submit_analysis().await.unwrap();

        let mut types = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            types.push(msg.message_type());
        }
        assert_eq!(
            types,
            vec!["input_changed", "request_started", "request_settled"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_expires() {
        let (session, _, _) = setup(false);
        session.submit_analysis().await.unwrap_err();
        assert!(session.current_error().is_some());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(session.check_error_expiration().await);
        assert!(session.snapshot().await.error.is_none());
    }
}
