mod preprocess;
mod rvm;
pub mod types;
mod worker;

pub use preprocess::Preprocessor;
pub use rvm::RobustVideoMatting;
pub use types::{
    Architecture, InternalResolution, ModelConfig, SegmentationMask, SegmentationOptions, Segmenter,
};
pub use worker::InferenceWorker;

use anyhow::Result;

/// Create the default segmentation model (RVM)
pub fn create_default_model(model_path: &str, config: ModelConfig) -> Result<Box<dyn Segmenter + Send>> {
    let model = RobustVideoMatting::new(model_path, config)?;
    Ok(Box::new(model))
}
