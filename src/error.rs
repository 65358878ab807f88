//! Error handling for the posture capture client
//!
//! Every failure path ends up as a user-visible string. The variants follow
//! the failure categories of the capture pipeline: validation, capture,
//! media access and analysis (network / service / client fault).

use crate::ai_client::AnalysisError;
use crate::frame_capture::CaptureError;
use crate::media_capture::MediaAccessError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input rejected before any network call
    #[error("{0}")]
    Validation(String),

    /// Frame not ready / empty encode
    #[error("{0}")]
    Capture(#[from] CaptureError),

    /// Camera permission or device failure
    #[error("Webcam error: {0}")]
    MediaAccess(#[from] MediaAccessError),

    /// Network, service or local fault around the analysis request
    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    /// Analyze requested with nothing selected
    #[error("Please select a file first")]
    NoInput,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable error code for logs and serialized state
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Capture(_) => "CAPTURE_ERROR",
            Error::MediaAccess(_) => "MEDIA_ACCESS_ERROR",
            Error::Analysis(AnalysisError::ServerRejected { .. }) => "SERVICE_ERROR",
            Error::Analysis(AnalysisError::NoResponse) => "NETWORK_ERROR",
            Error::Analysis(AnalysisError::ClientSideFault(_)) => "CLIENT_FAULT",
            Error::NoInput => "NO_INPUT",
            Error::Io(_) => "IO_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message shown to the user
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}
