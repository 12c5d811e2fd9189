use smiley_img::error::{Result, SmileyError};
use smiley_img::frame::Frame;
use smiley_img::frame_loop::FrameSource;
use tracing::{debug, error, info};

use nokhwa::{
    Camera, nokhwa_initialize,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution,
    },
};

const REQUESTED_FPS: u32 = 30;

/// Webcam stream. The stream is stopped when this is dropped.
///
/// Failing to open reports a plain `Capture` error; `open_with_fallback`
/// turns the final failure into a startup error.
pub struct CameraSource {
    camera: Camera,
}

fn capture_err(e: impl std::fmt::Display) -> SmileyError {
    SmileyError::Capture(e.to_string())
}

impl CameraSource {
    /// Open device `index`, asking for the closest format to `width`x`height`.
    pub fn open(index: u32, width: u32, height: u32) -> Result<Self> {
        Self::open_index(CameraIndex::Index(index), width, height)
    }

    /// Open the first device the platform lists.
    pub fn open_any(width: u32, height: u32) -> Result<Self> {
        let cameras = query(ApiBackend::Auto).map_err(capture_err)?;
        cameras
            .iter()
            .for_each(|cam| debug!("Found camera: {}", cam.human_name()));

        let first = cameras
            .first()
            .ok_or_else(|| capture_err("no capture devices found"))?;
        Self::open_index(first.index().clone(), width, height)
    }

    fn open_index(index: CameraIndex, width: u32, height: u32) -> Result<Self> {
        nokhwa_initialize(|granted| {
            debug!("Camera access granted: {}", granted);
        });

        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(width, height),
                FrameFormat::MJPEG,
                REQUESTED_FPS,
            ),
        ));
        let mut camera = Camera::new(index.clone(), format).map_err(capture_err)?;
        camera.open_stream().map_err(capture_err)?;

        let resolution = camera.resolution();
        info!(
            "Capturing from camera {:?} at {}x{}",
            index,
            resolution.width(),
            resolution.height()
        );
        Ok(Self { camera })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Frame> {
        let buffer = self
            .camera
            .frame()
            .map_err(capture_err)?;
        let pixels = buffer
            .decode_image::<RgbFormat>()
            .map_err(capture_err)?;
        Ok(Frame::from_rgb(pixels))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            error!("Failed to stop camera stream {e:?}");
        }
    }
}
