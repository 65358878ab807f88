//! FrameCapture - Still image from a live stream
//!
//! ## Responsibilities
//!
//! - Refuse streams that have not decoded a frame yet
//! - Draw the current frame onto a raster sized to the stream's native
//!   resolution (640x480 when unreported)
//! - Encode as JPEG at quality 80 and tag it as `webcam_frame.jpg`

use crate::media_capture::{MediaStream, VideoFrame, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::models::InputBlob;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

/// JPEG quality for captured frames (0.8)
pub const CAPTURE_JPEG_QUALITY: u8 = 80;

/// Frame capture failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// No live camera attached
    #[error("Webcam not initialized")]
    NoStream,

    /// Surface has not decoded a frame yet
    #[error("Webcam not ready. Please wait for video to load.")]
    NotReady,

    /// Frame bytes do not match the declared size
    #[error("Failed to capture frame: malformed frame ({0} bytes)")]
    MalformedFrame(usize),

    /// Encoder error
    #[error("Failed to capture frame: {0}")]
    Encode(String),

    /// Encoder produced nothing
    #[error("Failed to capture frame - no image data")]
    EmptyCapture,
}

/// Capture the current frame of `stream` as a JPEG payload
pub fn capture_frame(stream: &dyn MediaStream) -> Result<InputBlob, CaptureError> {
    if !stream.ready_state().has_current_frame() {
        return Err(CaptureError::NotReady);
    }

    let frame = stream.current_frame().ok_or(CaptureError::NotReady)?;

    let (width, height) = stream
        .video_dimensions()
        .filter(|(w, h)| *w > 0 && *h > 0)
        .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));

    let canvas = draw_frame(frame, width, height)?;
    let jpeg = encode_jpeg(&canvas, CAPTURE_JPEG_QUALITY)?;

    if jpeg.is_empty() {
        return Err(CaptureError::EmptyCapture);
    }

    tracing::debug!(
        stream_id = %stream.id(),
        width,
        height,
        size = jpeg.len(),
        "Frame captured"
    );

    Ok(InputBlob::webcam_frame(jpeg))
}

/// Copy the frame onto a `width` x `height` raster, scaling if needed
fn draw_frame(frame: VideoFrame, width: u32, height: u32) -> Result<RgbImage, CaptureError> {
    let len = frame.data.len();
    let source = RgbImage::from_raw(frame.width, frame.height, frame.data)
        .ok_or(CaptureError::MalformedFrame(len))?;

    if source.dimensions() == (width, height) {
        Ok(source)
    } else {
        Ok(imageops::resize(&source, width, height, FilterType::Triangle))
    }
}

fn encode_jpeg(canvas: &RgbImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(canvas)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(buffer)
}
