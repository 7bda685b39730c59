use anyhow::{Context, Result};
use block_matte::capture::{CaptureSource, WebcamCapture};
use block_matte::output::V4L2Output;
use block_matte::segmentation::{self, Architecture, InferenceWorker, InternalResolution, ModelConfig};
use block_matte::{CompositorConfig, FrameScheduler, SegmentationOptions};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Output resolution width (defaults to the capture width)
    #[arg(long)]
    output_width: Option<u32>,

    /// Output resolution height (defaults to the capture height)
    #[arg(long)]
    output_height: Option<u32>,

    /// Display refresh rate driving the frame loop
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,

    /// Path to segmentation model (ONNX file)
    #[arg(long)]
    model: String,

    /// Backbone the model was exported with
    #[arg(long, value_enum, default_value_t = Architecture::MobileNetV1)]
    architecture: Architecture,

    #[arg(long, default_value_t = 16)]
    output_stride: u32,

    #[arg(long, default_value_t = 0.75)]
    multiplier: f32,

    #[arg(long, default_value_t = 4)]
    quant_bytes: u8,

    /// Mirror frames before segmentation
    #[arg(long)]
    flip_horizontal: bool,

    /// Model input scale relative to the camera frame
    #[arg(long, value_enum, default_value_t = InternalResolution::High)]
    internal_resolution: InternalResolution,

    /// Minimum confidence for a pixel to count as body
    #[arg(long, default_value_t = 0.9)]
    segmentation_threshold: f32,

    /// Grid pitch between sample points, in pixels
    #[arg(long, default_value_t = 20)]
    resolution_min: u32,

    /// Side of the square searched around each sample point, in pixels
    #[arg(long, default_value_t = 300)]
    search_radius: u32,

    /// Paint blocks that contain a body red instead of freezing them
    #[arg(long)]
    highlight: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("block-matte starting");

    let model_config = ModelConfig {
        architecture: args.architecture,
        output_stride: args.output_stride,
        multiplier: args.multiplier,
        quant_bytes: args.quant_bytes,
    };
    model_config.validate().context("Invalid model configuration")?;

    let options = SegmentationOptions {
        flip_horizontal: args.flip_horizontal,
        internal_resolution: args.internal_resolution,
        segmentation_threshold: args.segmentation_threshold,
    };

    let compositor = CompositorConfig {
        resolution_min: args.resolution_min,
        search_radius: args.search_radius,
        debug: args.highlight,
    };

    // Model loads in the background; the loop idles until it is ready
    let model_path = args.model.clone();
    let worker = InferenceWorker::spawn(
        move || segmentation::create_default_model(&model_path, model_config),
        options,
    )
    .context("Failed to start segmentation worker")?;

    let capture = WebcamCapture::new(args.input_device).context("Failed to initialize webcam capture")?;
    let (capture_width, capture_height) = capture.resolution();

    let output_width = args.output_width.unwrap_or(capture_width);
    let output_height = args.output_height.unwrap_or(capture_height);
    let mut output = V4L2Output::new(&args.output_device, output_width, output_height)
        .context("Failed to initialize v4l2loopback output")?;

    tracing::info!("Capture: {}x{}", capture_width, capture_height);
    tracing::info!("Output: {}x{}", output_width, output_height);
    tracing::info!("Target FPS: {}", args.fps);

    let mut scheduler =
        FrameScheduler::new(capture, worker, compositor).context("Failed to start session")?;

    scheduler.run(&mut output, args.fps)
}
