//! Posture Capture Library
//!
//! Client-side capture-and-analysis orchestrator for a remote posture
//! analysis service.
//!
//! ## Architecture (8 Components)
//!
//! 1. FileValidator - Size / type / emptiness checks before any network call
//! 2. PreviewRegistry - Preview handles for image uploads
//! 3. MediaCapture - Camera access (ffmpeg device, synthetic device)
//! 4. InputSource - Exclusive ownership of the active input and its resources
//! 5. FrameCapture - Current camera frame -> JPEG payload
//! 6. AIClient - Posture analysis service adapter
//! 7. AnalysisOrchestrator - Single-flight requests, deferred mode changes
//! 8. CaptureSession - Intent facade, observable state
//!
//! RealtimeHub distributes state changes; TransientError holds the
//! self-expiring user-visible error.
//!
//! ## Design Principles
//!
//! - SSoT: CaptureSession owns all session state
//! - One input at a time, released before the next is acquired
//! - Every failure path returns to Idle / None

pub mod ai_client;
pub mod analysis_orchestrator;
pub mod capture_session;
pub mod file_validator;
pub mod frame_capture;
pub mod input_source;
pub mod media_capture;
pub mod preview_registry;
pub mod realtime_hub;
pub mod transient_error;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
