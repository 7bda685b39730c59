mod loopback;

pub use loopback::V4L2Output;

use anyhow::Result;

use crate::frame::Frame;

/// Trait for output destinations
pub trait OutputSink {
    /// Present the composited frame
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
}
