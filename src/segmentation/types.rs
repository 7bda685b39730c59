use anyhow::Result;
use clap::ValueEnum;

use crate::error::Error;
use crate::frame::Frame;

/// Per-pixel body labels for one frame, row-major.
///
/// Zero is background; any other value marks a pixel that belongs to a
/// recognised body part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    labels: Vec<u8>,
}

impl SegmentationMask {
    pub fn new(width: u32, height: u32, labels: Vec<u8>) -> Result<Self, Error> {
        let expected = width as usize * height as usize;
        if labels.len() != expected {
            return Err(Error::MaskLength {
                expected,
                actual: labels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            labels,
        })
    }

    /// A mask with every pixel set to `label`.
    pub fn filled(width: u32, height: u32, label: u8) -> Self {
        Self {
            width,
            height,
            labels: vec![label; width as usize * height as usize],
        }
    }

    /// Binarise a matte: values strictly above `threshold` become body (1).
    pub fn from_matte(matte: &[f32], width: u32, height: u32, threshold: f32) -> Result<Self, Error> {
        let labels = matte
            .iter()
            .map(|&v| u8::from(v > threshold))
            .collect();
        Self::new(width, height, labels)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn is_body(&self, x: u32, y: u32) -> bool {
        self.labels[y as usize * self.width as usize + x as usize] != 0
    }

    /// Mark one pixel as body. Used to build masks by hand.
    pub fn set_body(&mut self, x: u32, y: u32) {
        self.labels[y as usize * self.width as usize + x as usize] = 1;
    }
}

/// How far the frame is downsampled before it reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum InternalResolution {
    Low,
    Medium,
    #[default]
    High,
    Full,
}

impl InternalResolution {
    pub fn scale(self) -> f32 {
        match self {
            Self::Low => 0.25,
            Self::Medium => 0.5,
            Self::High => 0.75,
            Self::Full => 1.0,
        }
    }
}

/// Options sent with every segmentation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationOptions {
    /// Mirror the frame before inference.
    pub flip_horizontal: bool,
    pub internal_resolution: InternalResolution,
    /// Minimum confidence, in [0, 1], for a pixel to count as body.
    pub segmentation_threshold: f32,
}

impl Default for SegmentationOptions {
    fn default() -> Self {
        Self {
            flip_horizontal: false,
            internal_resolution: InternalResolution::High,
            segmentation_threshold: 0.9,
        }
    }
}

impl SegmentationOptions {
    pub fn validate(&self) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&self.segmentation_threshold) {
            return Err(Error::InvalidConfig(format!(
                "segmentation threshold {} outside [0, 1]",
                self.segmentation_threshold
            )));
        }
        Ok(())
    }
}

/// Backbone the exported model was built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Architecture {
    #[default]
    MobileNetV1,
    ResNet50,
}

/// Load-time model selection. Fixed for the life of a session.
///
/// Only `output_stride` changes runtime behaviour: it rounds the model input
/// size. `architecture`, `multiplier` and `quant_bytes` describe the exported
/// ONNX file the caller points at; they are validated and logged but do not
/// pick the file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelConfig {
    pub architecture: Architecture,
    pub output_stride: u32,
    pub multiplier: f32,
    pub quant_bytes: u8,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            architecture: Architecture::MobileNetV1,
            output_stride: 16,
            multiplier: 0.75,
            quant_bytes: 4,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), Error> {
        let (strides, multipliers): (&[u32], &[f32]) = match self.architecture {
            Architecture::MobileNetV1 => (&[8, 16], &[0.5, 0.75, 1.0]),
            Architecture::ResNet50 => (&[16, 32], &[1.0]),
        };

        if !strides.contains(&self.output_stride) {
            return Err(Error::InvalidConfig(format!(
                "output stride {} not supported by {:?} (expected one of {:?})",
                self.output_stride, self.architecture, strides
            )));
        }
        if !multipliers.contains(&self.multiplier) {
            return Err(Error::InvalidConfig(format!(
                "multiplier {} not supported by {:?} (expected one of {:?})",
                self.multiplier, self.architecture, multipliers
            )));
        }
        if ![1, 2, 4].contains(&self.quant_bytes) {
            return Err(Error::InvalidConfig(format!(
                "quant bytes {} must be 1, 2 or 4",
                self.quant_bytes
            )));
        }
        Ok(())
    }

    /// Model input size for a frame: scaled by `resolution`, then rounded
    /// down to a whole number of output strides (never below one stride).
    pub fn input_size(&self, frame_width: u32, frame_height: u32, resolution: InternalResolution) -> (u32, u32) {
        let stride = self.output_stride.max(1);
        let fit = |dim: u32| {
            let scaled = (dim as f32 * resolution.scale()) as u32;
            (scaled / stride).max(1) * stride
        };
        (fit(frame_width), fit(frame_height))
    }
}

/// Trait for segmentation models
/// Allows swapping between different backends
pub trait Segmenter {
    /// Label every pixel of `frame` as body or background.
    ///
    /// The returned mask has the same dimensions as `frame`.
    fn segment(&mut self, frame: &Frame, options: &SegmentationOptions) -> Result<SegmentationMask>;
}
