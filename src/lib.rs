//! Block-sampled background suppression for live video.
//!
//! A segmentation model labels body pixels in each camera frame. The
//! [`compositor`] walks the frame on a coarse grid and refreshes only those
//! neighbourhoods with no body pixel nearby, so the viewer sees a live
//! background while the subject region stays frozen. The [`scheduler`] keeps
//! at most one segmentation request in flight and drops frames meanwhile.

pub mod capture;
pub mod compositor;
pub mod error;
pub mod frame;
pub mod output;
pub mod scheduler;
pub mod segmentation;

pub use compositor::{BlockCompositor, CompositorConfig, SearchWindow};
pub use error::{Error, Result};
pub use frame::Frame;
pub use scheduler::{BackendStatus, FrameScheduler, InferenceBackend, TickOutcome};
pub use segmentation::{SegmentationMask, SegmentationOptions, Segmenter};
