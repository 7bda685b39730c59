mod v4l_capture;

pub use v4l_capture::WebcamCapture;

use anyhow::Result;

use crate::frame::Frame;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Draw the current camera image into `frame`.
    ///
    /// `frame` must already have the capture resolution; it is overwritten
    /// in place.
    fn capture_into(&mut self, frame: &mut Frame) -> Result<()>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}
