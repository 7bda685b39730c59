//! RGBA frame buffers shared by capture, compositing and presentation.

use image::{Rgba, RgbaImage};

use anyhow::{ensure, Result};

/// Owned, contiguous RGBA8 pixel buffer. Row stride is `width * 4`.
pub type Frame = RgbaImage;

pub const CHANNELS: usize = 4;

/// Allocate an opaque black frame.
pub fn blank(width: u32, height: u32) -> Frame {
    RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]))
}

/// Bytes per row of a frame.
pub fn stride(frame: &Frame) -> usize {
    frame.width() as usize * CHANNELS
}

/// Copy packed RGB8 camera pixels into an existing RGBA buffer without
/// reallocating it. Alpha is forced opaque.
pub fn copy_rgb_into(rgb: &[u8], width: u32, height: u32, dst: &mut Frame) -> Result<()> {
    ensure!(
        (width, height) == dst.dimensions(),
        "camera frame is {}x{}, buffer is {}x{}",
        width,
        height,
        dst.width(),
        dst.height()
    );
    let expected = width as usize * height as usize * 3;
    ensure!(
        rgb.len() == expected,
        "RGB frame has {} bytes, expected {expected}",
        rgb.len()
    );

    for (d, s) in dst.chunks_exact_mut(CHANNELS).zip(rgb.chunks_exact(3)) {
        d[..3].copy_from_slice(s);
        d[3] = 255;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn copy_rgb_forces_opaque_alpha() {
        let src = RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        let mut dst = RgbaImage::from_pixel(3, 2, Rgba([0, 0, 0, 7]));

        copy_rgb_into(src.as_raw(), 3, 2, &mut dst).unwrap();

        assert!(dst.pixels().all(|p| p.0 == [10, 20, 30, 255]));
    }

    #[test]
    fn copy_rgb_rejects_other_sizes() {
        let src = RgbImage::new(4, 2);
        let mut dst = blank(3, 2);

        let err = copy_rgb_into(src.as_raw(), 4, 2, &mut dst).unwrap_err();
        assert!(err.to_string().contains("4x2"));
        assert!(dst.pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn copy_rgb_rejects_truncated_input() {
        let mut dst = blank(2, 2);
        let err = copy_rgb_into(&[0; 11], 2, 2, &mut dst).unwrap_err();
        assert!(err.to_string().contains("11 bytes"));
        assert!(dst.pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn stride_is_four_bytes_per_pixel() {
        assert_eq!(stride(&blank(7, 1)), 28);
    }
}
