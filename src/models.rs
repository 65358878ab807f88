//! Shared data types
//!
//! Input blobs, analysis modes and the verdict returned by the
//! posture analysis service.

use crate::error::{Error, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Filename attached to frames captured from the live camera
pub const WEBCAM_FRAME_NAME: &str = "webcam_frame.jpg";

/// Filename used when an upload has no name of its own
pub const DEFAULT_UPLOAD_NAME: &str = "upload.jpg";

/// Where a blob came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobOrigin {
    Upload,
    Webcam,
}

/// A candidate input: uploaded file or captured frame
#[derive(Clone, PartialEq, Eq)]
pub struct InputBlob {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub origin: BlobOrigin,
}

impl InputBlob {
    /// Create an uploaded-file blob
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        let name = name.into();
        Self {
            name: if name.is_empty() {
                DEFAULT_UPLOAD_NAME.to_string()
            } else {
                name
            },
            mime_type: mime_type.into(),
            data,
            origin: BlobOrigin::Upload,
        }
    }

    /// Create a blob for a JPEG frame grabbed from the camera
    pub fn webcam_frame(jpeg: Vec<u8>) -> Self {
        Self {
            name: WEBCAM_FRAME_NAME.to_string(),
            mime_type: "image/jpeg".to_string(),
            data: jpeg,
            origin: BlobOrigin::Webcam,
        }
    }

    /// Read a file from disk, deriving the mime type from its extension
    pub async fn from_path(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, mime_type_for_path(path), data))
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Whether the blob is a still image (previewable)
    pub fn is_image(&self) -> bool {
        crate::file_validator::SUPPORTED_IMAGE_TYPES.contains(&self.mime_type.as_str())
    }

    /// Descriptor used in logs and request state
    pub fn descriptor(&self) -> PayloadDescriptor {
        PayloadDescriptor {
            file_name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size(),
            origin: self.origin,
        }
    }
}

impl fmt::Debug for InputBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputBlob")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.data.len())
            .field("origin", &self.origin)
            .finish()
    }
}

/// Metadata of a submitted payload (no bytes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadDescriptor {
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub origin: BlobOrigin,
}

/// Guess a mime type from a file extension
pub fn mime_type_for_path(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogg" | "ogv" => "video/ogg",
        "avi" => "video/avi",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Analysis variant requested from the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    #[default]
    Squat,
    Sitting,
}

impl AnalysisMode {
    /// Wire value for the `posture_type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Squat => "squat",
            AnalysisMode::Sitting => "sitting",
        }
    }

    /// Human label
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisMode::Squat => "Squat Analysis",
            AnalysisMode::Sitting => "Sitting Analysis",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "squat" => Ok(AnalysisMode::Squat),
            "sitting" => Ok(AnalysisMode::Sitting),
            other => Err(format!(
                "Invalid posture type '{}'. Use 'squat' or 'sitting'",
                other
            )),
        }
    }
}

/// Verdict returned by the analysis service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub has_bad_posture: bool,

    #[serde(default)]
    pub issues: Vec<String>,

    /// Encoded image reference, usually a `data:image/jpeg;base64,` URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_image: Option<String>,

    /// Mode echoed back by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posture_type: Option<AnalysisMode>,
}

impl AnalysisResult {
    /// Decode the annotated image if it is an inline base64 data URL
    pub fn annotated_image_bytes(&self) -> Result<Option<Vec<u8>>> {
        let Some(reference) = self.annotated_image.as_deref() else {
            return Ok(None);
        };

        let Some(rest) = reference.strip_prefix("data:") else {
            return Ok(None);
        };

        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::Internal("Malformed data URL".to_string()))?;

        if !meta.ends_with(";base64") {
            return Ok(None);
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| Error::Internal(format!("Invalid annotated image: {}", e)))?;

        Ok(Some(bytes))
    }
}
