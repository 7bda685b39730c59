use anyhow::{Context, Result};
use image::{imageops, ImageBuffer, Luma, RgbaImage};
use ndarray::Array4;

use crate::frame::Frame;

/// Converts camera frames into model input tensors and model mattes back into
/// frame-sized confidence maps.
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Preprocess an RGBA frame into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Mirror horizontally if requested
    /// 2. Resize to target dimensions
    /// 3. Drop alpha, normalize to [0, 1], transpose HWC to NCHW
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, frame: &Frame, flip_horizontal: bool) -> Result<Array4<f32>> {
        let _span = tracing::debug_span!("preprocess").entered();

        let flipped;
        let source: &RgbaImage = if flip_horizontal {
            flipped = imageops::flip_horizontal(frame);
            &flipped
        } else {
            frame
        };

        let resized = if source.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                source,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            source.clone()
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                tensor[[0, c, y, x]] = pixel[c] as f32 / 255.0;
            }
        }

        Ok(tensor)
    }

    /// Resize a model matte back to frame dimensions
    ///
    /// # Arguments
    /// * `matte` - Flattened matte at model resolution
    /// * `matte_width` - Width of the matte
    /// * `matte_height` - Height of the matte
    /// * `target_width` - Desired output width
    /// * `target_height` - Desired output height
    ///
    /// Returns: Resized matte flattened in row-major order
    pub fn postprocess_matte(
        matte: &[f32],
        matte_width: u32,
        matte_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<Vec<f32>> {
        let _span = tracing::debug_span!("postprocess").entered();

        let expected = matte_width as usize * matte_height as usize;
        anyhow::ensure!(
            matte.len() == expected,
            "matte has {} values, expected {}x{}",
            matte.len(),
            matte_width,
            matte_height
        );

        if matte_width == target_width && matte_height == target_height {
            return Ok(matte.to_vec());
        }

        // Resize in f32 so confidences keep full precision for thresholding
        let source: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(matte_width, matte_height, matte.to_vec())
                .context("matte buffer does not match its dimensions")?;

        let resized = imageops::resize(
            &source,
            target_width,
            target_height,
            imageops::FilterType::Triangle,
        );

        Ok(resized.into_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn tensor_is_nchw_and_normalised() {
        let frame = RgbaImage::from_fn(4, 2, |x, _| Rgba([if x == 0 { 255 } else { 0 }, 51, 0, 9]));
        let pre = Preprocessor::new(4, 2);

        let tensor = pre.preprocess(&frame, false).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 2, 4]);
        assert_eq!(tensor[[0, 0, 1, 0]], 1.0);
        assert_eq!(tensor[[0, 0, 1, 3]], 0.0);
        assert!((tensor[[0, 1, 0, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn flip_mirrors_columns() {
        let frame = RgbaImage::from_fn(4, 1, |x, _| Rgba([if x == 0 { 255 } else { 0 }, 0, 0, 255]));
        let pre = Preprocessor::new(4, 1);

        let tensor = pre.preprocess(&frame, true).unwrap();
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert_eq!(tensor[[0, 0, 0, 3]], 1.0);
    }

    #[test]
    fn matte_same_size_passes_through() {
        let matte = vec![0.0, 0.5, 1.0, 0.25];
        let out = Preprocessor::postprocess_matte(&matte, 2, 2, 2, 2).unwrap();
        assert_eq!(out, matte);
    }

    #[test]
    fn matte_is_resized_to_frame() {
        let matte = vec![1.0; 4];
        let out = Preprocessor::postprocess_matte(&matte, 2, 2, 6, 4).unwrap();
        assert_eq!(out.len(), 24);
        assert!(out.iter().all(|&v| (v - 1.0).abs() < 1e-5));
    }

    #[test]
    fn resized_matte_keeps_confidence_just_above_threshold() {
        let matte = vec![0.9015; 4];
        let out = Preprocessor::postprocess_matte(&matte, 2, 2, 6, 4).unwrap();

        assert!(out.iter().all(|&v| (v - 0.9015).abs() < 1e-4));
        let mask = crate::segmentation::SegmentationMask::from_matte(&out, 6, 4, 0.9).unwrap();
        assert!(mask.labels().iter().all(|&l| l == 1));
    }

    #[test]
    fn short_matte_is_an_error() {
        assert!(Preprocessor::postprocess_matte(&[0.0; 3], 2, 2, 4, 4).is_err());
    }
}
