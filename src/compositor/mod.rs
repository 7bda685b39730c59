//! compositor: block-wise background replacement driven by a coarse mask
//!
//! The frame is walked on a regular grid. Around every grid point a large
//! square search window is tested for body pixels. Clean windows are refreshed
//! from the live camera frame; contaminated windows keep whatever the output
//! already shows, so a subject standing in front of the camera is never
//! overwritten and leaves a frozen halo of old background around it.

mod integral;

pub use integral::BodyIntegral;

use crate::error::{Error, Result};
use crate::frame::{self, Frame, CHANNELS};
use crate::segmentation::SegmentationMask;

/// Colour painted over contaminated windows when `debug` is on.
pub const HIGHLIGHT: [u8; 4] = [255, 0, 0, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositorConfig {
    /// Grid pitch between sample points, in pixels.
    pub resolution_min: u32,
    /// Side length of the square search window around each sample point.
    pub search_radius: u32,
    /// Paint contaminated windows with [`HIGHLIGHT`] instead of leaving them.
    pub debug: bool,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            resolution_min: 20,
            search_radius: 300,
            debug: false,
        }
    }
}

impl CompositorConfig {
    pub fn search_offset(&self) -> u32 {
        self.search_radius / 2
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolution_min == 0 {
            return Err(Error::InvalidConfig("resolution_min must be at least 1".into()));
        }
        Ok(())
    }

    /// Search window around sample point `(x, y)`, clamped to the frame.
    pub fn search_window(&self, x: u32, y: u32, width: u32, height: u32) -> SearchWindow {
        let offset = self.search_offset();
        SearchWindow {
            x_min: x.saturating_sub(offset),
            x_max: x.saturating_add(offset).min(width),
            y_min: y.saturating_sub(offset),
            y_max: y.saturating_add(offset).min(height),
        }
    }

    /// Grid sample points in visiting order: columns outer, rows inner.
    ///
    /// Sampling starts one pitch in from the top-left corner, so the leading
    /// strip narrower than one pitch has no sample point of its own.
    pub fn sample_points(&self, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
        let step = self.resolution_min.max(1);
        (step..width)
            .step_by(step as usize)
            .flat_map(move |x| (step..height).step_by(step as usize).map(move |y| (x, y)))
    }
}

/// Half-open pixel rectangle `[x_min, x_max) x [y_min, y_max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl SearchWindow {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        (self.x_min..self.x_max).contains(&x) && (self.y_min..self.y_max).contains(&y)
    }
}

/// Per-pass counters, mostly for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompositeReport {
    pub samples: u32,
    pub contaminated: u32,
}

/// Rewrites the output frame from the live frame, one search window at a time.
pub struct BlockCompositor {
    config: CompositorConfig,
    integral: BodyIntegral,
}

impl BlockCompositor {
    pub fn new(config: CompositorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            integral: BodyIntegral::new(),
        })
    }

    /// Composite one frame in place.
    ///
    /// `output`, `live` and `mask` must all share the same dimensions; the
    /// call is rejected before any pixel is touched otherwise.
    pub fn apply(&mut self, output: &mut Frame, live: &Frame, mask: &SegmentationMask) -> Result<CompositeReport> {
        let (width, height) = output.dimensions();
        if live.dimensions() != (width, height) || mask.dimensions() != (width, height) {
            return Err(Error::DimensionMismatch {
                output: output.dimensions(),
                live: live.dimensions(),
                mask: mask.dimensions(),
            });
        }

        let _span = tracing::debug_span!("composite", width, height).entered();

        self.integral.rebuild(mask);

        let mut report = CompositeReport::default();
        for (x, y) in self.config.sample_points(width, height) {
            let window = self.config.search_window(x, y, width, height);
            report.samples += 1;

            if !self.integral.any(window.x_min, window.y_min, window.x_max, window.y_max) {
                copy_window(output, live, window);
            } else {
                report.contaminated += 1;
                if self.config.debug {
                    fill_window(output, window, HIGHLIGHT);
                }
            }
        }

        tracing::debug!(
            samples = report.samples,
            contaminated = report.contaminated,
            "composite pass done"
        );

        Ok(report)
    }
}

/// Byte range of one window row inside a frame's raw buffer.
fn row_span(stride: usize, row: u32, window: SearchWindow) -> std::ops::Range<usize> {
    let start = row as usize * stride + window.x_min as usize * CHANNELS;
    let end = row as usize * stride + window.x_max as usize * CHANNELS;
    start..end
}

fn copy_window(output: &mut Frame, live: &Frame, window: SearchWindow) {
    let stride = frame::stride(output);
    let src_buf: &[u8] = live;
    let dst_buf: &mut [u8] = output;
    for row in window.y_min..window.y_max {
        let span = row_span(stride, row, window);
        let src = &src_buf[span.clone()];
        let dst = &mut dst_buf[span];
        for (d, s) in dst.chunks_exact_mut(CHANNELS).zip(src.chunks_exact(CHANNELS)) {
            d[..3].copy_from_slice(&s[..3]);
            d[3] = 255;
        }
    }
}

fn fill_window(output: &mut Frame, window: SearchWindow, colour: [u8; 4]) {
    let stride = frame::stride(output);
    let buf: &mut [u8] = output;
    for row in window.y_min..window.y_max {
        let span = row_span(stride, row, window);
        for px in buf[span].chunks_exact_mut(CHANNELS) {
            px.copy_from_slice(&colour);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    const STALE: Rgba<u8> = Rgba([1, 2, 3, 4]);

    /// Live frame whose pixels encode their own position.
    fn live_frame(width: u32, height: u32) -> Frame {
        RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 200, 17]))
    }

    fn compositor(config: CompositorConfig) -> BlockCompositor {
        BlockCompositor::new(config).unwrap()
    }

    fn small_config(debug: bool) -> CompositorConfig {
        CompositorConfig {
            resolution_min: 20,
            search_radius: 20,
            debug,
        }
    }

    /// Pixels covered by at least one sample window.
    fn covered(config: &CompositorConfig, width: u32, height: u32) -> Vec<bool> {
        let mut out = vec![false; (width * height) as usize];
        for (x, y) in config.sample_points(width, height) {
            let w = config.search_window(x, y, width, height);
            for py in w.y_min..w.y_max {
                for px in w.x_min..w.x_max {
                    out[(py * width + px) as usize] = true;
                }
            }
        }
        out
    }

    #[test]
    fn clean_mask_refreshes_every_covered_pixel() {
        let (width, height) = (70, 50);
        let config = small_config(false);
        let live = live_frame(width, height);
        let mut output = RgbaImage::from_pixel(width, height, STALE);

        let report = compositor(config)
            .apply(&mut output, &live, &SegmentationMask::filled(width, height, 0))
            .unwrap();
        assert_eq!(report.contaminated, 0);

        let covered = covered(&config, width, height);
        for (x, y, px) in output.enumerate_pixels() {
            if covered[(y * width + x) as usize] {
                let l = live.get_pixel(x, y);
                assert_eq!(px.0, [l[0], l[1], l[2], 255], "pixel ({x},{y})");
            } else {
                assert_eq!(*px, STALE, "pixel ({x},{y})");
            }
        }
        // Offset 10 around the first sample at 20 leaves columns/rows 0..10 alone.
        assert_eq!(*output.get_pixel(5, 30), STALE);
        assert_eq!(*output.get_pixel(30, 9), STALE);
        assert_eq!(output.get_pixel(10, 10).0, [10, 10, 200, 255]);
    }

    #[test]
    fn full_body_mask_leaves_output_untouched() {
        let (width, height) = (64, 48);
        let live = live_frame(width, height);
        let mut output = RgbaImage::from_pixel(width, height, STALE);
        let before = output.clone();

        let report = compositor(CompositorConfig::default())
            .apply(&mut output, &live, &SegmentationMask::filled(width, height, 1))
            .unwrap();

        assert_eq!(report.contaminated, report.samples);
        assert_eq!(output, before);
    }

    #[test]
    fn debug_paints_contaminated_windows() {
        let (width, height) = (70, 50);
        let config = small_config(true);
        let live = live_frame(width, height);
        let mut output = RgbaImage::from_pixel(width, height, STALE);

        compositor(config)
            .apply(&mut output, &live, &SegmentationMask::filled(width, height, 7))
            .unwrap();

        let covered = covered(&config, width, height);
        for (x, y, px) in output.enumerate_pixels() {
            if covered[(y * width + x) as usize] {
                assert_eq!(px.0, HIGHLIGHT);
            } else {
                assert_eq!(*px, STALE);
            }
        }
    }

    #[test]
    fn second_pass_with_clean_mask_changes_nothing() {
        let (width, height) = (90, 60);
        let live = live_frame(width, height);
        let mask = SegmentationMask::filled(width, height, 0);
        let mut comp = compositor(small_config(false));

        let mut once = RgbaImage::from_pixel(width, height, STALE);
        comp.apply(&mut once, &live, &mask).unwrap();
        let mut twice = once.clone();
        comp.apply(&mut twice, &live, &mask).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn single_sample_covers_entire_small_frame() {
        let config = CompositorConfig::default();
        let points: Vec<_> = config.sample_points(40, 40).collect();
        assert_eq!(points, vec![(20, 20)]);

        let window = config.search_window(20, 20, 40, 40);
        assert_eq!(
            window,
            SearchWindow {
                x_min: 0,
                x_max: 40,
                y_min: 0,
                y_max: 40
            }
        );

        let live = live_frame(40, 40);
        let mut output = RgbaImage::from_pixel(40, 40, STALE);
        compositor(config)
            .apply(&mut output, &live, &SegmentationMask::filled(40, 40, 0))
            .unwrap();
        for (x, y, px) in output.enumerate_pixels() {
            assert_eq!(px.0, [x as u8, y as u8, 200, 255]);
        }
    }

    #[test]
    fn offset_of_exactly_one_pitch_still_covers_small_frame() {
        let config = CompositorConfig {
            search_radius: 40,
            ..Default::default()
        };
        assert_eq!(config.search_offset(), 20);
        let window = config.search_window(20, 20, 40, 40);
        assert!(window.contains(0, 0) && window.contains(39, 39));
    }

    #[test]
    fn distant_body_pixel_still_blocks_replacement() {
        // One body pixel well outside the sample's own block but inside its
        // search window keeps the whole frame frozen.
        let (width, height) = (40, 40);
        let live = live_frame(width, height);
        let mut output = RgbaImage::from_pixel(width, height, STALE);
        let mut mask = SegmentationMask::filled(width, height, 0);
        mask.set_body(0, 39);

        let report = compositor(CompositorConfig::default())
            .apply(&mut output, &live, &mask)
            .unwrap();

        assert_eq!(report.contaminated, 1);
        assert!(output.pixels().all(|p| *p == STALE));
    }

    #[test]
    fn neighbouring_clean_window_overwrites_overlap() {
        // Offset 20: the window of (20, 20) is x 0..40, the window of (40, 20)
        // is x 20..60. Only the first sees the body pixel; the overlap is
        // refreshed by the second.
        let (width, height) = (60, 30);
        let config = CompositorConfig {
            resolution_min: 20,
            search_radius: 40,
            debug: false,
        };
        let live = live_frame(width, height);
        let mut output = RgbaImage::from_pixel(width, height, STALE);
        let mut mask = SegmentationMask::filled(width, height, 0);
        mask.set_body(5, 15);

        let report = compositor(config).apply(&mut output, &live, &mask).unwrap();
        assert_eq!(report.samples, 2);
        assert_eq!(report.contaminated, 1);

        assert_eq!(*output.get_pixel(10, 15), STALE);
        assert_eq!(output.get_pixel(25, 15).0, [25, 15, 200, 255]);
        assert_eq!(output.get_pixel(59, 0).0, [59, 0, 200, 255]);
    }

    #[test]
    fn debug_overlap_follows_visit_order() {
        // Windows x 0..40 then x 20..60; the later sample wins the overlap.
        let (width, height) = (60, 30);
        let config = CompositorConfig {
            resolution_min: 20,
            search_radius: 40,
            debug: true,
        };
        let live = live_frame(width, height);

        // Body on the left: highlight first, then the clean copy covers 20..40.
        let mut output = RgbaImage::from_pixel(width, height, STALE);
        let mut mask = SegmentationMask::filled(width, height, 0);
        mask.set_body(5, 15);
        compositor(config).apply(&mut output, &live, &mask).unwrap();

        assert_eq!(output.get_pixel(10, 15).0, HIGHLIGHT);
        assert_eq!(output.get_pixel(25, 15).0, [25, 15, 200, 255]);
        assert_eq!(output.get_pixel(50, 15).0, [50, 15, 200, 255]);

        // Body on the right: clean copy first, then the highlight covers 20..40.
        let mut output = RgbaImage::from_pixel(width, height, STALE);
        let mut mask = SegmentationMask::filled(width, height, 0);
        mask.set_body(55, 15);
        compositor(config).apply(&mut output, &live, &mask).unwrap();

        assert_eq!(output.get_pixel(10, 15).0, [10, 15, 200, 255]);
        assert_eq!(output.get_pixel(25, 15).0, HIGHLIGHT);
        assert_eq!(output.get_pixel(50, 15).0, HIGHLIGHT);
    }

    #[test]
    fn mismatched_buffers_are_rejected_without_writes() {
        let live = live_frame(40, 30);
        let mut output = RgbaImage::from_pixel(40, 40, STALE);
        let before = output.clone();
        let mut comp = compositor(CompositorConfig::default());

        let err = comp
            .apply(&mut output, &live, &SegmentationMask::filled(40, 40, 0))
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));

        let live = live_frame(40, 40);
        let err = comp
            .apply(&mut output, &live, &SegmentationMask::filled(20, 40, 0))
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));

        assert_eq!(output, before);
    }

    #[test]
    fn frame_smaller_than_one_pitch_has_no_samples() {
        let live = live_frame(15, 15);
        let mut output = RgbaImage::from_pixel(15, 15, STALE);

        let report = compositor(CompositorConfig::default())
            .apply(&mut output, &live, &SegmentationMask::filled(15, 15, 0))
            .unwrap();

        assert_eq!(report.samples, 0);
        assert!(output.pixels().all(|p| *p == STALE));
    }

    #[test]
    fn zero_pitch_is_rejected() {
        let config = CompositorConfig {
            resolution_min: 0,
            ..Default::default()
        };
        assert!(BlockCompositor::new(config).is_err());
    }
}
