use super::OutputSink;
use crate::frame::{Frame, CHANNELS};
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

/// Presents frames on a v4l2loopback device as packed YUYV.
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
    yuyv: Vec<u8>,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // Announce the frame format so readers see the right geometry
        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let format = Output::set_format(&device, &Format::new(width, height, FourCC::new(b"YUYV")))
            .context("Failed to set YUYV output format")?;
        tracing::debug!("v4l2loopback format: {}", format);

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            file,
            width,
            height,
            yuyv: Vec::with_capacity((width * height * 2) as usize),
        })
    }
}

/// Pack an RGBA frame into YUV 4:2:2 (YUYV). Alpha is ignored.
fn rgba_to_yuyv(frame: &Frame, out: &mut Vec<u8>) {
    let (width, height) = frame.dimensions();
    out.clear();

    let raw: &[u8] = frame;
    let stride = width as usize * CHANNELS;
    for y in 0..height as usize {
        let row = &raw[y * stride..(y + 1) * stride];
        for pair in row.chunks(CHANNELS * 2) {
            let p1 = &pair[..CHANNELS];
            // Odd widths repeat the last pixel
            let p2 = pair.get(CHANNELS..).filter(|p| p.len() == CHANNELS).unwrap_or(p1);

            let (y1, u1, v1) = rgb_to_yuv(p1[0], p1[1], p1[2]);
            let (y2, u2, v2) = rgb_to_yuv(p2[0], p2[1], p2[2]);

            // Average U and V for the pair of pixels
            let u = ((u1 as u16 + u2 as u16) / 2) as u8;
            let v = ((v1 as u16 + v2 as u16) / 2) as u8;

            out.extend_from_slice(&[y1, u, y2, v]);
        }
    }
}

/// Convert RGB to YUV color space
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let frame = if frame.dimensions() != (self.width, self.height) {
            Cow::Owned(image::imageops::resize(
                frame,
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            ))
        } else {
            Cow::Borrowed(frame)
        };

        rgba_to_yuyv(&frame, &mut self.yuyv);

        self.file
            .write_all(&self.yuyv)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }
}
