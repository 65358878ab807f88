//! FileValidator - Input acceptance check
//!
//! Pure check applied when a file is selected and again right before it is
//! submitted. Rules run in order and the first failure wins:
//!
//! 1. a blob must be present
//! 2. size must not exceed 50MB
//! 3. mime type must be a supported image or video type
//! 4. size must be non-zero

use crate::error::{Error, Result};
use crate::models::InputBlob;
use serde::{Deserialize, Serialize};

/// Maximum accepted size (50MB)
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Still image types (these get a preview)
pub const SUPPORTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// Video types
pub const SUPPORTED_VIDEO_TYPES: &[&str] = &["video/mp4", "video/webm", "video/ogg", "video/avi"];

/// Outcome of validating a blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub accepted: bool,
    pub reason: Option<String>,
}

impl ValidationVerdict {
    fn accept() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }

    /// Convert into a Result, rejections becoming `Error::Validation`
    pub fn into_result(self) -> Result<()> {
        if self.accepted {
            Ok(())
        } else {
            Err(Error::Validation(
                self.reason.unwrap_or_else(|| "Invalid file".to_string()),
            ))
        }
    }
}

/// Whether a mime type is in the supported set
pub fn is_supported_type(mime_type: &str) -> bool {
    SUPPORTED_IMAGE_TYPES.contains(&mime_type) || SUPPORTED_VIDEO_TYPES.contains(&mime_type)
}

/// Validate a candidate blob
pub fn validate(blob: Option<&InputBlob>) -> ValidationVerdict {
    let Some(blob) = blob else {
        return ValidationVerdict::reject("No file selected");
    };

    if blob.size() > MAX_FILE_SIZE {
        return ValidationVerdict::reject(format!(
            "File size too large. Maximum size is {}MB",
            MAX_FILE_SIZE / (1024 * 1024)
        ));
    }

    if !is_supported_type(&blob.mime_type) {
        return ValidationVerdict::reject(
            "Unsupported file type. Please use JPEG, PNG, WebP images or MP4, WebM videos",
        );
    }

    if blob.size() == 0 {
        return ValidationVerdict::reject("File is empty");
    }

    ValidationVerdict::accept()
}
