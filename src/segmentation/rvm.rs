use super::preprocess::Preprocessor;
use super::types::{ModelConfig, SegmentationMask, SegmentationOptions, Segmenter};
use crate::frame::Frame;
use anyhow::{Context, Result};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

const HIDDEN_INPUTS: [&str; 4] = ["r1i", "r2i", "r3i", "r4i"];
const HIDDEN_OUTPUTS: [&str; 4] = ["r1o", "r2o", "r3o", "r4o"];

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
pub struct RobustVideoMatting {
    session: Session,
    config: ModelConfig,
    preprocessor: Option<Preprocessor>,

    // Recurrent hidden states, fed back in the next frame
    hidden: Option<[Array4<f32>; 4]>,

    // Downsample ratio for hidden states
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX file
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    /// * `config` - Load-time model selection, validated before loading
    pub fn new<P: AsRef<Path>>(model_path: P, config: ModelConfig) -> Result<Self> {
        let path = model_path.as_ref();
        config.validate()?;

        tracing::info!(
            architecture = ?config.architecture,
            output_stride = config.output_stride,
            multiplier = config.multiplier,
            quant_bytes = config.quant_bytes,
            "Loading RVM model from {}",
            path.display()
        );

        let session = Session::builder()
            .context("failed to create ORT session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("failed to set ORT optimization level")?
            .with_intra_threads(4)
            .context("failed to set ORT intra threads")?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        Ok(Self {
            session,
            config,
            preprocessor: None,
            hidden: None,
            downsample_ratio: 0.25,
        })
    }

    /// Initial hidden states: RVM accepts 1x1x1x1 zeros on the first frame.
    fn initial_hidden_states() -> [Array4<f32>; 4] {
        std::array::from_fn(|_| Array4::zeros((1, 1, 1, 1)))
    }

    /// Pick the preprocessor for this frame, dropping hidden state whenever
    /// the model input size changes.
    fn prepare(&mut self, frame: &Frame, options: &SegmentationOptions) {
        let (w, h) = frame.dimensions();
        let size = self.config.input_size(w, h, options.internal_resolution);

        let stale = self
            .preprocessor
            .as_ref()
            .map_or(true, |p| p.target_size() != size);
        if stale {
            tracing::debug!("Model input size now {}x{}", size.0, size.1);
            self.preprocessor = Some(Preprocessor::new(size.0, size.1));
            self.hidden = None;
        }
    }
}

fn to_tensor(array: &Array4<f32>) -> Result<Tensor<f32>> {
    let shape: [usize; 4] = [
        array.shape()[0],
        array.shape()[1],
        array.shape()[2],
        array.shape()[3],
    ];
    let data: Vec<f32> = array.iter().copied().collect();
    Tensor::from_array((shape, data.into_boxed_slice())).context("failed to create input tensor")
}

fn extract_array(outputs: &ort::session::SessionOutputs<'_>, name: &str) -> Result<Array4<f32>> {
    let (shape, data) = outputs[name]
        .try_extract_tensor::<f32>()
        .with_context(|| format!("failed to extract RVM output {name}"))?;
    anyhow::ensure!(shape.len() == 4, "RVM output {name} is not 4-D: {:?}", shape);
    let dims = (
        shape[0] as usize,
        shape[1] as usize,
        shape[2] as usize,
        shape[3] as usize,
    );
    Array4::from_shape_vec(dims, data.to_vec())
        .with_context(|| format!("RVM output {name} has inconsistent shape"))
}

impl Segmenter for RobustVideoMatting {
    fn segment(&mut self, frame: &Frame, options: &SegmentationOptions) -> Result<SegmentationMask> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        self.prepare(frame, options);
        let preprocessor = self
            .preprocessor
            .as_ref()
            .context("preprocessor not initialised")?;

        let input = preprocessor.preprocess(frame, options.flip_horizontal)?;
        let src = to_tensor(&input)?;

        let hidden = self.hidden.get_or_insert_with(Self::initial_hidden_states);
        let [r1, r2, r3, r4] = [
            to_tensor(&hidden[0])?,
            to_tensor(&hidden[1])?,
            to_tensor(&hidden[2])?,
            to_tensor(&hidden[3])?,
        ];
        let ratio = Tensor::from_array(([1usize], vec![self.downsample_ratio].into_boxed_slice()))
            .context("failed to create downsample ratio tensor")?;

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![
                "src" => src,
                HIDDEN_INPUTS[0] => r1,
                HIDDEN_INPUTS[1] => r2,
                HIDDEN_INPUTS[2] => r3,
                HIDDEN_INPUTS[3] => r4,
                "downsample_ratio" => ratio
            ])
            .context("Failed to run inference")?;
        drop(_infer_span);

        // Outputs: fgr (foreground), pha (alpha), r1o..r4o. Only the matte and
        // the recurrent state are needed.
        let pha = extract_array(&outputs, "pha")?;
        let next_hidden = [
            extract_array(&outputs, HIDDEN_OUTPUTS[0])?,
            extract_array(&outputs, HIDDEN_OUTPUTS[1])?,
            extract_array(&outputs, HIDDEN_OUTPUTS[2])?,
            extract_array(&outputs, HIDDEN_OUTPUTS[3])?,
        ];
        drop(outputs);
        self.hidden = Some(next_hidden);

        let (matte_height, matte_width) = (pha.shape()[2] as u32, pha.shape()[3] as u32);
        let matte_flat: Vec<f32> = pha.iter().copied().collect();

        let (frame_width, frame_height) = frame.dimensions();
        let matte = Preprocessor::postprocess_matte(
            &matte_flat,
            matte_width,
            matte_height,
            frame_width,
            frame_height,
        )?;

        Ok(SegmentationMask::from_matte(
            &matte,
            frame_width,
            frame_height,
            options.segmentation_threshold,
        )?)
    }
}
