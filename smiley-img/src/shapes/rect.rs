/// Axis-aligned face bounds in source-frame pixels, origin top-left.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width,
            height,
        }
    }

    /// Clip possibly out-of-frame bounds (detectors may report boxes that
    /// hang over the edge) to a `frame_width`x`frame_height` frame.
    pub fn clipped(
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> FaceRegion {
        let clip = |start: i32, len: u32, limit: u32| -> (u32, u32) {
            let end = (start as i64 + len as i64).clamp(0, limit as i64) as u32;
            let start = (start as i64).clamp(0, limit as i64) as u32;
            (start, end - start)
        };

        let (x, width) = clip(x, width, frame_width);
        let (y, height) = clip(y, height, frame_height);
        FaceRegion::new(x, y, width, height)
    }
}
