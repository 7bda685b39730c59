//! scheduler: paces segmentation requests to the display refresh
//!
//! One request is in flight at most. Display refreshes that arrive while a
//! request is outstanding drop their camera frame instead of queueing it.
//! When a mask comes back it is composited on the calling thread and the gate
//! reopens, whether inference succeeded or not.

use std::time::{Duration, Instant};

use anyhow::Context;

use crate::capture::CaptureSource;
use crate::compositor::{BlockCompositor, CompositorConfig};
use crate::error::{Error, Result};
use crate::frame::{self, Frame};
use crate::output::OutputSink;
use crate::segmentation::SegmentationMask;

/// Log averaged timings after this many composited frames.
const STATS_INTERVAL: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    Loading,
    Ready,
    Failed(String),
}

/// Asynchronous segmentation service as seen by the scheduler.
pub trait InferenceBackend {
    /// Whether the model has finished loading.
    fn status(&mut self) -> BackendStatus;

    /// Start segmenting `frame`. Only called while no request is outstanding.
    fn submit(&mut self, frame: Frame) -> Result<()>;

    /// Non-blocking check for the outstanding request's result.
    fn poll(&mut self) -> Option<Result<SegmentationMask>>;
}

/// What a single [`FrameScheduler::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Model still loading; nothing captured.
    ModelLoading,
    /// A request is outstanding; this refresh's frame was dropped.
    InFlight,
    /// A fresh frame was captured and sent for segmentation.
    Dispatched,
    /// Capturing failed; the gate stays open for the next refresh.
    CaptureSkipped,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub dispatched: u64,
    pub composited: u64,
    pub failed: u64,
    pub dropped: u64,
    pub total_segment_time: Duration,
    pub total_composite_time: Duration,
}

pub struct FrameScheduler<C, B> {
    capture: C,
    backend: B,
    compositor: BlockCompositor,
    output: Frame,
    live: Frame,
    // true while no segmentation request is outstanding
    gate: bool,
    in_flight_since: Option<Instant>,
    stats: SchedulerStats,
}

impl<C, B> FrameScheduler<C, B>
where
    C: CaptureSource,
    B: InferenceBackend,
{
    /// Start a session: size both buffers to the capture resolution and draw
    /// the first camera frame into the output so there is something to show
    /// before the first mask arrives.
    pub fn new(mut capture: C, backend: B, config: CompositorConfig) -> Result<Self> {
        let compositor = BlockCompositor::new(config)?;

        let (width, height) = capture.resolution();
        if width == 0 || height == 0 {
            return Err(Error::CaptureUnavailable(format!(
                "capture reports empty resolution {width}x{height}"
            )));
        }

        let mut output = frame::blank(width, height);
        capture
            .capture_into(&mut output)
            .map_err(|e| Error::CaptureUnavailable(format!("{e:#}")))?;
        let live = output.clone();

        tracing::info!(
            width,
            height,
            resolution_min = config.resolution_min,
            search_radius = config.search_radius,
            debug = config.debug,
            "Frame scheduler ready"
        );

        Ok(Self {
            capture,
            backend,
            compositor,
            output,
            live,
            gate: true,
            in_flight_since: None,
            stats: SchedulerStats::default(),
        })
    }

    pub fn output(&self) -> &Frame {
        &self.output
    }

    pub fn live(&self) -> &Frame {
        &self.live
    }

    /// True when no segmentation request is outstanding.
    pub fn is_idle(&self) -> bool {
        self.gate
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Handle one display refresh.
    ///
    /// Only startup-class failures (model never loaded, segmenter gone) are
    /// returned as errors; per-frame failures are logged and skipped.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        self.stats.ticks += 1;

        match self.backend.status() {
            BackendStatus::Loading => return Ok(TickOutcome::ModelLoading),
            BackendStatus::Failed(reason) => return Err(Error::ModelUnavailable(reason)),
            BackendStatus::Ready => {}
        }

        if !self.gate {
            match self.backend.poll() {
                Some(result) => self.complete(result),
                None => {
                    self.stats.dropped += 1;
                    return Ok(TickOutcome::InFlight);
                }
            }
        }

        self.dispatch()
    }

    fn complete(&mut self, result: Result<SegmentationMask>) {
        if let Some(started) = self.in_flight_since.take() {
            self.stats.total_segment_time += started.elapsed();
        }

        match result {
            Ok(mask) => {
                let start = Instant::now();
                match self.compositor.apply(&mut self.output, &self.live, &mask) {
                    Ok(report) => {
                        self.stats.total_composite_time += start.elapsed();
                        self.stats.composited += 1;
                        tracing::debug!(
                            samples = report.samples,
                            contaminated = report.contaminated,
                            "frame composited"
                        );
                        self.log_stats();
                    }
                    Err(e) => {
                        self.stats.failed += 1;
                        tracing::warn!("composite rejected, skipping frame: {e}");
                    }
                }
            }
            Err(e) => {
                self.stats.failed += 1;
                tracing::warn!("segmentation failed, skipping frame: {e}");
            }
        }

        self.gate = true;
    }

    fn dispatch(&mut self) -> Result<TickOutcome> {
        if let Err(e) = self.capture.capture_into(&mut self.live) {
            tracing::warn!("capture failed, skipping frame: {e:#}");
            return Ok(TickOutcome::CaptureSkipped);
        }

        self.gate = false;
        self.in_flight_since = Some(Instant::now());
        if let Err(e) = self.backend.submit(self.live.clone()) {
            self.gate = true;
            self.in_flight_since = None;
            return Err(e);
        }

        self.stats.dispatched += 1;
        Ok(TickOutcome::Dispatched)
    }

    fn log_stats(&self) {
        let s = &self.stats;
        if !stats_due(s.composited) {
            return;
        }
        let avg_ms = |total: Duration| total.as_secs_f64() * 1000.0 / s.composited as f64;
        tracing::info!(
            "Frame {}: segment={:.1}ms, composite={:.1}ms, dropped={}, failed={}",
            s.composited,
            avg_ms(s.total_segment_time),
            avg_ms(s.total_composite_time),
            s.dropped,
            s.failed
        );
    }

    /// Drive the loop at `refresh_hz`, presenting the output on every refresh.
    ///
    /// Runs until a terminal error occurs.
    pub fn run<O: OutputSink>(&mut self, sink: &mut O, refresh_hz: u32) -> anyhow::Result<()> {
        let frame_duration = Duration::from_secs_f32(1.0 / refresh_hz.max(1) as f32);

        tracing::info!("Starting frame loop at {} Hz", refresh_hz);
        tracing::info!("Press Ctrl+C to stop");

        let mut waiting_for_model = false;
        loop {
            let refresh_start = Instant::now();

            match self.tick()? {
                TickOutcome::ModelLoading if !waiting_for_model => {
                    tracing::info!("Waiting for segmentation model to load");
                    waiting_for_model = true;
                }
                _ => {}
            }

            sink.write_frame(&self.output)
                .context("Failed to present frame")?;

            let elapsed = refresh_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }
    }
}

/// Whether averaged timings are logged after `composited` frames.
fn stats_due(composited: u64) -> bool {
    composited > 0 && composited % STATS_INTERVAL == 0
}
