#![warn(unused_extern_crates)]
use anyhow::{Context, Result};
use clap::Parser;
use image::RgbaImage;
use smiley_img::error::{Resource, SmileyError};
use smiley_img::frame::StillSource;
use smiley_img::frame_loop::{FrameLoop, open_with_fallback};
use smiley_img::imggpu::gpu::GpuExecutor;
use smiley_img::imggpu::screen::Screen;
use smiley_img::imggpu::surface::OffscreenSurface;
use smiley_img::pipeline::{DetectorParams, FaceDetector};
use std::path::{Path, PathBuf};
use tracing::{Level, info, span};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use video::CameraSource;
use window::DesktopWindow;

mod video;
mod window;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct CmdArgs {
    /// Face detection model
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "models/seeta_fd_frontal_v1.0.bin"
    )]
    model: PathBuf,

    /// Image drawn over every detected face
    #[arg(long, value_name = "FILE", default_value = "assets/mignonSmile.png")]
    overlay: PathBuf,

    /// Requested capture width. The camera may pick another size
    #[arg(long, default_value = "640")]
    width: u32,

    /// Requested capture height
    #[arg(long, default_value = "480")]
    height: u32,

    /// Preferred camera index. Any other camera is tried if it fails to open
    #[arg(short, long, default_value = "0")]
    camera: u32,

    /// Process single input frame, reading from input path
    #[arg(short, long, requires = "output")]
    input: Option<PathBuf>,

    /// Process single input frame, writing to output path
    #[arg(short, long, requires = "input")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env();
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_env_filter(filter)
        .init();

    let args = CmdArgs::parse();

    let detector = FaceDetector::from_model_path(&args.model, DetectorParams::default())
        .with_context(|| format!("loading face model {:?}", args.model))?;

    if let (Some(input), Some(output)) = (&args.input, &args.output) {
        return process_image(input, output, detector, &args.overlay);
    }

    let camera = open_with_fallback(
        || CameraSource::open(args.camera, args.width, args.height),
        || CameraSource::open_any(args.width, args.height),
    )?;

    let mut window = DesktopWindow::new(args.width, args.height)?;
    let (width, height) = window.inner_size();
    let (gpu, surface) = GpuExecutor::with_surface(window.window(), width, height)?;
    let overlay = load_overlay(&args.overlay)?;
    let screen = Screen::new(gpu, surface, &overlay)?;

    let mut frame_loop = FrameLoop::new(camera, detector, screen);
    frame_loop.run(&mut window)?;

    Ok(())
}

fn load_overlay(path: &Path) -> Result<RgbaImage> {
    let span = span!(Level::DEBUG, "load_overlay");
    let _guard = span.enter();

    let img = image::open(path).map_err(|e| SmileyError::startup(Resource::Image, e))?;
    info!("Loaded {}x{} overlay from {:?}", img.width(), img.height(), path);
    Ok(img.to_rgba8())
}

fn process_image(src: &Path, dest: &Path, detector: FaceDetector, overlay: &Path) -> Result<()> {
    let source = StillSource::open(src)?;
    let (width, height) = source
        .dimensions()
        .context("still input has no frame")?;

    let gpu = GpuExecutor::new()?;
    let surface = OffscreenSurface::new(&gpu, width, height);
    let screen = Screen::new(gpu, surface, &load_overlay(overlay)?)?;

    let mut frame_loop = FrameLoop::new(source, detector, screen);
    let faces = frame_loop.iterate()?;
    info!("Covered {faces} faces");

    let (_, _, screen) = frame_loop.into_parts();
    let result = screen.surface().read_pixels(screen.gpu())?;
    result
        .save(dest)
        .with_context(|| format!("writing {dest:?}"))?;

    Ok(())
}
