//! InputSource - Resource Lifecycle Manager
//!
//! ## Responsibilities
//!
//! - Hold exactly one active input: nothing, an uploaded file or a live camera
//! - Acquire the new input only after the previous one is released
//! - Release preview handles and camera tracks exactly once
//!
//! Switching direction:
//! - file -> camera: the file and its preview are dropped first
//! - camera -> file: the camera tracks are stopped first

mod manager;
mod types;

pub use manager::{InputSourceManager, Transition};
pub use types::{CameraStream, FileInfo, InputSource, InputSourceKind, SelectedFile};
