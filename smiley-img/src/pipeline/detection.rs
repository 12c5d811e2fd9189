use super::Detector;
use super::model::{Model, initialize_model};
use crate::error::{Resource, Result, SmileyError};
use crate::frame::GrayFrame;
use crate::shapes::rect::FaceRegion;
use std::path::Path;
use tracing::{Level, debug, span, trace, warn};

/// Smallest face the cascade accepts, in pixels.
pub const MIN_FACE_SIZE: u32 = 20;
/// Side of the cascade's scan window. Smaller frames are never scanned.
const SCAN_WINDOW: u32 = 40;
/// Accepted range of the pyramid shrink factor.
const PYRAMID_SHRINK: (f32, f32) = (0.01, 0.99);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorParams {
    /// Step between image pyramid levels, > 1.
    pub scale_factor: f32,
    /// How many overlapping candidate windows must agree on a face.
    pub min_neighbors: u32,
    pub min_face_size: u32,
    pub slide_step: (u32, u32),
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.3,
            min_neighbors: 5,
            min_face_size: MIN_FACE_SIZE,
            slide_step: (4, 4),
        }
    }
}

impl DetectorParams {
    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(SmileyError::startup(Resource::Model, reason));

        let shrink = 1. / self.scale_factor;
        if !(PYRAMID_SHRINK.0..=PYRAMID_SHRINK.1).contains(&shrink) {
            return invalid(format!(
                "scale factor must be in [{:.4}, {}], got {}",
                1. / PYRAMID_SHRINK.1,
                1. / PYRAMID_SHRINK.0,
                self.scale_factor
            ));
        }
        if self.min_neighbors == 0 {
            return invalid("minimum neighbours must be at least 1".into());
        }
        if self.min_face_size < MIN_FACE_SIZE {
            return invalid(format!(
                "minimum face size must be at least {MIN_FACE_SIZE}, got {}",
                self.min_face_size
            ));
        }
        if self.slide_step.0 == 0 || self.slide_step.1 == 0 {
            return invalid("slide step must be non-zero".into());
        }
        Ok(())
    }
}

pub struct FaceDetector {
    params: DetectorParams,
    engine: Option<Box<dyn rustface::Detector>>,
    empty_model: bool,
}

impl FaceDetector {
    /*
    SeetaFace funnel cascade run through rustface.

    The engine scans an image pyramid with a sliding window, then merges
    overlapping candidate windows, summing their scores. Each agreeing
    candidate contributes roughly one to the merged score, so the score
    threshold plays the role of the minimum neighbour count.

    The pyramid is expressed as a shrink factor in (0, 1), the inverse of
    the scale step.
     */
    pub fn new(params: DetectorParams) -> Self {
        Self {
            params,
            engine: None,
            empty_model: false,
        }
    }

    pub fn from_model_path(path: &Path, params: DetectorParams) -> Result<Self> {
        let mut detector = Self::new(params);
        detector.load(path)?;
        Ok(detector)
    }

    pub fn load(&mut self, path: &Path) -> Result<()> {
        let span = span!(Level::DEBUG, "FaceDetector#load");
        let _guard = span.enter();

        self.params.validate()?;
        let model = initialize_model(path)?;
        debug!("Read face model from {:?}", path);
        self.load_model(model)
    }

    /// Install an already parsed model. A model without classifiers loads
    /// but never finds a face.
    pub fn load_model(&mut self, model: Model) -> Result<()> {
        self.params.validate()?;

        self.empty_model = model.get_hierarchy_count() == 0;
        if self.empty_model {
            warn!("Face model has no classifiers");
        }

        let mut engine = rustface::create_detector_with_model(model);
        engine.set_pyramid_scale_factor(1. / self.params.scale_factor);
        engine.set_score_thresh(self.params.min_neighbors as f64);
        engine.set_min_face_size(self.params.min_face_size);
        engine.set_slide_window_step(self.params.slide_step.0, self.params.slide_step.1);

        debug!("Face detector ready with {:?}", self.params);
        self.engine = Some(engine);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }
}

impl Detector for FaceDetector {
    fn detect(&mut self, gray: &GrayFrame) -> Result<Vec<FaceRegion>> {
        let span = span!(Level::DEBUG, "face_detector");
        let _guard = span.enter();

        let engine = self.engine.as_mut().ok_or(SmileyError::DetectorNotReady)?;

        let (width, height) = (gray.width(), gray.height());
        let smallest = self.params.min_face_size.max(SCAN_WINDOW);
        if self.empty_model || width < smallest || height < smallest || gray.is_uniform() {
            trace!("Nothing to scan in {width}x{height} frame");
            return Ok(Vec::new());
        }

        let faces = engine.detect(&rustface::ImageData::new(gray.as_raw(), width, height));

        let regions = faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceRegion::clipped(
                    bbox.x(),
                    bbox.y(),
                    bbox.width(),
                    bbox.height(),
                    width,
                    height,
                )
            })
            .collect::<Vec<_>>();

        trace!("Detected {} faces", regions.len());
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::model::parse_model;
    use image::{GrayImage, Luma};
    use rstest::rstest;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn model_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../models/seeta_fd_frontal_v1.0.bin")
    }

    fn loaded_detector() -> Option<FaceDetector> {
        FaceDetector::from_model_path(&model_path(), DetectorParams::default()).ok()
    }

    #[test]
    fn test_unloaded_detector_not_ready() {
        let mut detector = FaceDetector::new(DetectorParams::default());
        let gray = GrayFrame::new(GrayImage::from_pixel(64, 64, Luma([0])));

        assert!(!detector.is_ready());
        assert!(matches!(
            detector.detect(&gray),
            Err(SmileyError::DetectorNotReady)
        ));
    }

    #[test]
    fn test_missing_model_is_startup_error() {
        let err = FaceDetector::from_model_path(
            Path::new("/nonexistent/face.bin"),
            DetectorParams::default(),
        )
        .err();

        assert!(matches!(
            err,
            Some(SmileyError::StartupResource {
                resource: Resource::Model,
                ..
            })
        ));
    }

    fn empty_detector() -> FaceDetector {
        let model = parse_model(Cursor::new(0i32.to_le_bytes()), "empty").unwrap();
        let mut detector = FaceDetector::new(DetectorParams::default());
        detector.load_model(model).unwrap();
        detector
    }

    fn textured(width: u32, height: u32) -> GrayFrame {
        GrayFrame::new(GrayImage::from_fn(width, height, |x, y| {
            Luma([((x * 7 + y * 13) % 256) as u8])
        }))
    }

    #[rstest]
    #[case::no_pyramid_step(DetectorParams { scale_factor: 1., ..Default::default() })]
    #[case::step_too_fine(DetectorParams { scale_factor: 1.01, ..Default::default() })]
    #[case::step_too_coarse(DetectorParams { scale_factor: 101., ..Default::default() })]
    #[case::no_neighbours(DetectorParams { min_neighbors: 0, ..Default::default() })]
    #[case::face_too_small(DetectorParams { min_face_size: 10, ..Default::default() })]
    #[case::face_just_below_limit(DetectorParams { min_face_size: 19, ..Default::default() })]
    #[case::no_slide_step(DetectorParams { slide_step: (0, 4), ..Default::default() })]
    fn test_invalid_params_rejected(#[case] params: DetectorParams) {
        let model = parse_model(Cursor::new(0i32.to_le_bytes()), "empty").unwrap();
        let mut detector = FaceDetector::new(params);

        let err = detector.load_model(model).unwrap_err();
        assert!(matches!(
            err,
            SmileyError::StartupResource {
                resource: Resource::Model,
                ..
            }
        ));
        assert!(!detector.is_ready());
        assert!(FaceDetector::from_model_path(&model_path(), params).is_err());
    }

    #[rstest]
    #[case(DetectorParams { scale_factor: 1.02, ..Default::default() })]
    #[case(DetectorParams { scale_factor: 100., ..Default::default() })]
    #[case(DetectorParams { min_neighbors: 1, min_face_size: 20, ..Default::default() })]
    fn test_boundary_params_accepted(#[case] params: DetectorParams) {
        let model = parse_model(Cursor::new(0i32.to_le_bytes()), "empty").unwrap();
        let mut detector = FaceDetector::new(params);
        detector.load_model(model).unwrap();
        assert!(detector.is_ready());
    }

    #[test]
    fn test_blank_frame_has_no_faces() {
        let mut detector = empty_detector();

        for shade in [0u8, 128, 255] {
            let gray = GrayFrame::new(GrayImage::from_pixel(640, 480, Luma([shade])));
            assert!(detector.detect(&gray).unwrap().is_empty());
        }
    }

    #[test]
    fn test_tiny_frame_has_no_faces() {
        let mut detector = empty_detector();

        for (w, h) in [(10, 10), (39, 200), (200, 39)] {
            assert!(detector.detect(&textured(w, h)).unwrap().is_empty());
        }
    }

    #[test]
    fn test_model_without_classifiers_finds_nothing() {
        let mut detector = empty_detector();
        assert!(detector.is_ready());
        assert!(detector.detect(&textured(640, 480)).unwrap().is_empty());
    }

    #[test]
    fn test_blank_frame_with_real_model() {
        let mut detector = match loaded_detector() {
            Some(d) => d,
            None => return,
        };

        let gray = GrayFrame::new(GrayImage::from_pixel(640, 480, Luma([128])));
        assert!(detector.detect(&gray).unwrap().is_empty());
    }
}
