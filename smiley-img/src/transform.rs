use crate::shapes::rect::FaceRegion;

/// Half-extent of the plane the background occupies at the overlay's depth.
/// Matches the projection frustum set up by the renderer; it is not derived
/// from it.
pub const HALF_EXTENT: f32 = 3.4;

/// Face size in pixels at which the overlay is drawn at scale 1.
pub const REFERENCE_SIZE: f32 = 72.;

/// Translation + scale that positions one overlay draw of the shared quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTransform {
    pub translate_x: f32,
    pub translate_y: f32,
    pub translate_z: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub scale_z: f32,
}

impl RenderTransform {
    pub fn translation(&self) -> [f32; 3] {
        [self.translate_x, self.translate_y, self.translate_z]
    }

    pub fn scale(&self) -> [f32; 3] {
        [self.scale_x, self.scale_y, self.scale_z]
    }
}

/// Maps pixel-space face regions into the overlay's model transform.
#[derive(Debug, Clone, Copy)]
pub struct TransformMapper {
    half_extent: f32,
    reference_size: f32,
}

impl Default for TransformMapper {
    fn default() -> Self {
        Self::new(HALF_EXTENT, REFERENCE_SIZE)
    }
}

impl TransformMapper {
    pub fn new(half_extent: f32, reference_size: f32) -> Self {
        Self {
            half_extent,
            reference_size,
        }
    }

    /*
     * Region origin is the frame's top-left, the render plane spans
     * [-K, K] on both axes. Pixel x=0 lands on +K since the video quad is
     * mirrored, pixel y=0 lands on +K since y points up.
     *
     * No rotation: detections are axis-aligned. A zero-sized region gives a
     * zero scale, which draws nothing.
     */
    pub fn map(&self, region: &FaceRegion, frame_width: u32, frame_height: u32) -> RenderTransform {
        let k = self.half_extent;
        let w = frame_width.max(1) as f32;
        let h = frame_height.max(1) as f32;

        RenderTransform {
            translate_x: k - (region.x as f32 / w) * 2. * k,
            translate_y: k - (region.y as f32 / h) * 2. * k,
            translate_z: 0.,
            scale_x: region.width as f32 / self.reference_size,
            scale_y: region.height as f32 / self.reference_size,
            scale_z: 1.,
        }
    }
}
