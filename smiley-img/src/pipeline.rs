use crate::error::Result;
use crate::frame::GrayFrame;
use crate::shapes::rect::FaceRegion;

pub mod detection;
mod model;

pub use detection::{DetectorParams, FaceDetector};

/// Finds faces in a luminance frame. Results are unordered and may be empty.
pub trait Detector {
    fn detect(&mut self, gray: &GrayFrame) -> Result<Vec<FaceRegion>>;
}
