use thiserror::Error;

/// Errors surfaced by the compositing core and its scheduler.
///
/// Startup errors (`ModelUnavailable`, `CaptureUnavailable`) end the session.
/// Everything else is local to one frame: the frame is skipped and the
/// scheduler gate is released.
#[derive(Debug, Error)]
pub enum Error {
    #[error("segmentation model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("capture device unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("segmentation failed: {0}")]
    InferenceFailure(String),

    #[error(
        "dimension mismatch: output {output:?}, live {live:?}, mask {mask:?} (width, height)"
    )]
    DimensionMismatch {
        output: (u32, u32),
        live: (u32, u32),
        mask: (u32, u32),
    },

    #[error("mask has {actual} labels, expected {expected}")]
    MaskLength { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
