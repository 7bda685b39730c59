use super::CaptureSource;
use crate::frame::{self, Frame};
use anyhow::{Context, Result};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    /// Open camera `device_index` at its highest resolution and start streaming.
    pub fn new(device_index: u32) -> Result<Self> {
        tracing::info!("Initializing webcam {}", device_index);

        let index = CameraIndex::Index(device_index);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera = Camera::new(index, requested).context("Failed to open camera")?;

        camera.open_stream().context("Failed to open camera stream")?;

        let resolution = camera.resolution();
        let (width, height) = (resolution.width(), resolution.height());

        tracing::info!("Webcam streaming at {}x{}", width, height);

        Ok(Self {
            camera,
            width,
            height,
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_into(&mut self, frame: &mut Frame) -> Result<()> {
        let raw = self.camera.frame().context("Failed to capture frame")?;

        let decoded = raw
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        frame::copy_rgb_into(decoded.as_raw(), decoded.width(), decoded.height(), frame)?;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
