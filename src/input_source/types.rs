//! InputSource types

use crate::media_capture::MediaStream;
use crate::models::InputBlob;
use crate::preview_registry::PreviewHandle;
use serde::{Deserialize, Serialize};

/// Kind of the active input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSourceKind {
    None,
    UploadedFile,
    LiveCamera,
}

/// An accepted upload and its preview (images only)
#[derive(Debug)]
pub struct SelectedFile {
    pub blob: InputBlob,
    pub preview: Option<PreviewHandle>,
}

/// Metadata of the selected file, for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub preview_url: Option<String>,
}

impl SelectedFile {
    pub fn info(&self) -> FileInfo {
        FileInfo {
            name: self.blob.name.clone(),
            size: self.blob.size(),
            mime_type: self.blob.mime_type.clone(),
            preview_url: self.preview.as_ref().map(|p| p.url()),
        }
    }
}

/// Owned camera stream - tracks are stopped on Drop
pub struct CameraStream {
    inner: Box<dyn MediaStream>,
}

impl CameraStream {
    pub fn new(inner: Box<dyn MediaStream>) -> Self {
        Self { inner }
    }

    pub fn stream(&self) -> &dyn MediaStream {
        self.inner.as_ref()
    }

    pub fn id(&self) -> &str {
        self.inner.id()
    }

    /// Stop all tracks (idempotent)
    pub fn stop(&mut self) {
        if self.inner.is_live() {
            tracing::info!(stream_id = %self.inner.id(), "Stopping camera stream");
        }
        self.inner.stop_tracks();
    }
}

impl std::fmt::Debug for CameraStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraStream")
            .field("id", &self.inner.id())
            .field("live", &self.inner.is_live())
            .finish()
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The single active input. Replacing it releases the previous
/// variant's resources.
#[derive(Debug, Default)]
pub enum InputSource {
    #[default]
    None,
    UploadedFile(SelectedFile),
    LiveCamera(CameraStream),
}

impl InputSource {
    pub fn kind(&self) -> InputSourceKind {
        match self {
            InputSource::None => InputSourceKind::None,
            InputSource::UploadedFile(_) => InputSourceKind::UploadedFile,
            InputSource::LiveCamera(_) => InputSourceKind::LiveCamera,
        }
    }
}
