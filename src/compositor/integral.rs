use crate::segmentation::SegmentationMask;

/// Summed-area table of body labels.
///
/// Answers "does this rectangle contain any body pixel" in constant time,
/// which gives the same answer as scanning the rectangle pixel by pixel.
/// The backing storage is reused across frames of the same size.
#[derive(Debug, Default)]
pub struct BodyIntegral {
    width: usize,
    height: usize,
    // (width + 1) * (height + 1), first row and column are zero.
    sums: Vec<u32>,
}

impl BodyIntegral {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild(&mut self, mask: &SegmentationMask) {
        let (w, h) = mask.dimensions();
        self.width = w as usize;
        self.height = h as usize;

        let cols = self.width + 1;
        self.sums.clear();
        self.sums.resize(cols * (self.height + 1), 0);

        for (y, row) in mask.labels().chunks_exact(self.width.max(1)).enumerate().take(self.height) {
            let mut run = 0u32;
            for (x, &label) in row.iter().enumerate() {
                run += u32::from(label != 0);
                self.sums[(y + 1) * cols + x + 1] = self.sums[y * cols + x + 1] + run;
            }
        }
    }

    /// Number of body pixels in `[x_min, x_max) x [y_min, y_max)`.
    pub fn count(&self, x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> u32 {
        let cols = self.width + 1;
        let (x0, y0) = (x_min as usize, y_min as usize);
        let (x1, y1) = (x_max as usize, y_max as usize);
        if x0 >= x1 || y0 >= y1 {
            return 0;
        }
        debug_assert!(x1 <= self.width && y1 <= self.height);

        let at = |x: usize, y: usize| self.sums[y * cols + x];
        // Rearranged so intermediate values never underflow.
        (at(x1, y1) + at(x0, y0)) - (at(x0, y1) + at(x1, y0))
    }

    pub fn any(&self, x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> bool {
        self.count(x_min, y_min, x_max, y_max) > 0
    }
}
