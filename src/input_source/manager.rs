//! Input source lifecycle

use super::types::*;
use crate::error::{Error, Result};
use crate::file_validator;
use crate::media_capture::{MediaConstraints, MediaDevices, MediaStream};
use crate::models::InputBlob;
use crate::preview_registry::PreviewRegistry;
use std::sync::Arc;

/// Source kinds before and after an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: InputSourceKind,
    pub current: InputSourceKind,
}

impl Transition {
    fn unchanged(kind: InputSourceKind) -> Self {
        Self {
            previous: kind,
            current: kind,
        }
    }

    pub fn changed(&self) -> bool {
        self.previous != self.current
    }

    /// Whether a live camera was stopped by this operation
    pub fn stopped_camera(&self) -> bool {
        self.previous == InputSourceKind::LiveCamera && self.current != InputSourceKind::LiveCamera
    }

    /// Whether an uploaded file was dropped by this operation
    pub fn dropped_file(&self) -> bool {
        self.previous == InputSourceKind::UploadedFile
    }
}

/// Owns the active input source and its resources
pub struct InputSourceManager {
    source: InputSource,
    devices: Arc<dyn MediaDevices>,
    previews: Arc<PreviewRegistry>,
    constraints: MediaConstraints,
}

impl InputSourceManager {
    /// Create new manager
    pub fn new(devices: Arc<dyn MediaDevices>, previews: Arc<PreviewRegistry>) -> Self {
        Self {
            source: InputSource::None,
            devices,
            previews,
            constraints: MediaConstraints::webcam(),
        }
    }

    pub fn kind(&self) -> InputSourceKind {
        self.source.kind()
    }

    pub fn selected_file(&self) -> Option<&SelectedFile> {
        match &self.source {
            InputSource::UploadedFile(file) => Some(file),
            _ => None,
        }
    }

    pub fn active_stream(&self) -> Option<&dyn MediaStream> {
        match &self.source {
            InputSource::LiveCamera(camera) => Some(camera.stream()),
            _ => None,
        }
    }

    pub fn has_preview(&self) -> bool {
        self.selected_file().map(|f| f.preview.is_some()).unwrap_or(false)
    }

    pub fn has_stream(&self) -> bool {
        matches!(self.source, InputSource::LiveCamera(_))
    }

    pub fn previews(&self) -> &Arc<PreviewRegistry> {
        &self.previews
    }

    /// Release the current source and leave `None` in its place
    fn release_current(&mut self) -> InputSourceKind {
        let previous = std::mem::take(&mut self.source);
        let kind = previous.kind();

        match previous {
            InputSource::None => {}
            InputSource::UploadedFile(file) => {
                tracing::debug!(
                    file_name = %file.blob.name,
                    has_preview = file.preview.is_some(),
                    "Releasing selected file"
                );
                drop(file);
            }
            InputSource::LiveCamera(mut camera) => {
                camera.stop();
            }
        }

        kind
    }

    /// Select an uploaded file
    ///
    /// Stops the camera first. A rejected blob leaves no selection behind.
    pub fn select_file(&mut self, blob: Option<InputBlob>) -> Result<Transition> {
        let previous = self.kind();

        if self.has_stream() {
            self.release_current();
        }

        if let Err(e) = file_validator::validate(blob.as_ref()).into_result() {
            self.release_current();
            tracing::info!(error = %e, "File rejected");
            return Err(e);
        }

        let Some(blob) = blob else {
            return Err(Error::Internal("validated blob missing".to_string()));
        };

        self.release_current();

        let preview = blob
            .is_image()
            .then(|| self.previews.create(blob.data.clone()));

        tracing::info!(
            file_name = %blob.name,
            size = blob.size(),
            mime_type = %blob.mime_type,
            preview = preview.is_some(),
            "File selected"
        );

        self.source = InputSource::UploadedFile(SelectedFile { blob, preview });

        Ok(Transition {
            previous,
            current: InputSourceKind::UploadedFile,
        })
    }

    /// Drop the selected file (no-op without one)
    pub fn clear_file(&mut self) -> Transition {
        let kind = self.kind();
        if kind != InputSourceKind::UploadedFile {
            return Transition::unchanged(kind);
        }

        self.release_current();
        Transition {
            previous: kind,
            current: InputSourceKind::None,
        }
    }

    /// Start the live camera
    ///
    /// Any selected file is released before access is requested. On
    /// failure the source stays `None`.
    pub async fn start_camera(&mut self) -> Result<Transition> {
        let previous = self.kind();
        if previous == InputSourceKind::LiveCamera {
            return Ok(Transition::unchanged(previous));
        }

        self.release_current();

        let stream = self
            .devices
            .get_user_media(&self.constraints)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Camera access failed");
                Error::MediaAccess(e)
            })?;

        let camera = CameraStream::new(stream);
        tracing::info!(stream_id = %camera.id(), "Camera started");
        self.source = InputSource::LiveCamera(camera);

        Ok(Transition {
            previous,
            current: InputSourceKind::LiveCamera,
        })
    }

    /// Stop the live camera (no-op without one)
    pub fn stop_camera(&mut self) -> Transition {
        let kind = self.kind();
        if kind != InputSourceKind::LiveCamera {
            return Transition::unchanged(kind);
        }

        self.release_current();
        Transition {
            previous: kind,
            current: InputSourceKind::None,
        }
    }

    /// Release whatever is held
    pub fn teardown(&mut self) -> Transition {
        let previous = self.release_current();
        if previous != InputSourceKind::None {
            tracing::info!(previous = ?previous, "Input source torn down");
        }
        Transition {
            previous,
            current: InputSourceKind::None,
        }
    }
}

impl Drop for InputSourceManager {
    fn drop(&mut self) {
        self.teardown();
    }
}
