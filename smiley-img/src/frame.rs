use crate::error::{Resource, Result, SmileyError};
use crate::frame_loop::FrameSource;
use image::{GrayImage, RgbImage, Rgba, RgbaImage, imageops};
use std::borrow::Cow;
use std::path::Path;
use tracing::debug;

/// Byte order of the three colour channels in a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// One captured colour image. Lives for a single loop iteration.
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: RgbImage,
    order: ChannelOrder,
}

/// Luminance-only copy of a frame, computed fresh each iteration for the detector.
#[derive(Debug, Clone)]
pub struct GrayFrame(GrayImage);

impl Frame {
    pub fn new(pixels: RgbImage, order: ChannelOrder) -> Self {
        Self { pixels, order }
    }

    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self::new(pixels, ChannelOrder::Rgb)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    fn rgb(&self) -> Cow<'_, RgbImage> {
        match self.order {
            ChannelOrder::Rgb => Cow::Borrowed(&self.pixels),
            ChannelOrder::Bgr => {
                let mut swapped = self.pixels.clone();
                for px in swapped.pixels_mut() {
                    px.0.swap(0, 2);
                }
                Cow::Owned(swapped)
            }
        }
    }

    pub fn to_gray(&self) -> GrayFrame {
        GrayFrame(imageops::grayscale(self.rgb().as_ref()))
    }

    /// Texture upload layout: RGBA, channel order corrected, fully opaque.
    pub fn to_rgba(&self) -> RgbaImage {
        let (width, height) = self.dimensions();
        RgbaImage::from_fn(width, height, |x, y| {
            let [c0, c1, c2] = self.pixels.get_pixel(x, y).0;
            match self.order {
                ChannelOrder::Rgb => Rgba([c0, c1, c2, 255]),
                ChannelOrder::Bgr => Rgba([c2, c1, c0, 255]),
            }
        })
    }
}

impl GrayFrame {
    pub fn new(pixels: GrayImage) -> Self {
        Self(pixels)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_raw(&self) -> &[u8] {
        self.0.as_raw()
    }

    /// No contrast anywhere in the frame.
    pub fn is_uniform(&self) -> bool {
        match self.0.as_raw().split_first() {
            Some((first, rest)) => rest.iter().all(|p| p == first),
            None => true,
        }
    }
}

/// Frame source over a single still image. Yields the image once, then
/// reports end of input.
pub struct StillSource {
    frame: Option<Frame>,
}

impl StillSource {
    pub fn new(frame: Frame) -> Self {
        Self { frame: Some(frame) }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let img = image::open(path).map_err(|e| SmileyError::startup(Resource::Capture, e))?;
        debug!("Loaded still input {:?} ({}x{})", path, img.width(), img.height());
        Ok(Self::new(Frame::from_rgb(img.into_rgb8())))
    }

    /// Dimensions of the pending frame, if it has not been consumed.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.frame.as_ref().map(Frame::dimensions)
    }
}

impl FrameSource for StillSource {
    fn next_frame(&mut self) -> Result<Frame> {
        self.frame
            .take()
            .ok_or_else(|| SmileyError::Capture("still input already consumed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_bgr_upload_swaps_channels() {
        let mut pixels = RgbImage::new(2, 1);
        pixels.put_pixel(0, 0, Rgb([10, 20, 30]));
        pixels.put_pixel(1, 0, Rgb([200, 100, 0]));

        let rgba = Frame::new(pixels, ChannelOrder::Bgr).to_rgba();

        assert_eq!(rgba.as_raw(), &vec![30, 20, 10, 255, 0, 100, 200, 255]);
    }

    #[test]
    fn test_rgb_upload_keeps_channels() {
        let pixels = RgbImage::from_pixel(1, 1, Rgb([1, 2, 3]));
        let rgba = Frame::from_rgb(pixels).to_rgba();
        assert_eq!(rgba.as_raw(), &vec![1, 2, 3, 255]);
    }

    #[test]
    fn test_upload_matches_frame_layout() {
        let mut pixels = RgbImage::new(3, 2);
        pixels.put_pixel(2, 1, Rgb([9, 8, 7]));

        let rgba = Frame::new(pixels, ChannelOrder::Bgr).to_rgba();

        assert_eq!(rgba.dimensions(), (3, 2));
        assert_eq!(rgba.as_raw().len(), 3 * 2 * 4);
        assert_eq!(rgba.get_pixel(2, 1).0, [7, 8, 9, 255]);
        assert_eq!(rgba.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_gray_ignores_channel_order() {
        let rgb = RgbImage::from_pixel(3, 2, Rgb([250, 10, 40]));
        let bgr = RgbImage::from_pixel(3, 2, Rgb([40, 10, 250]));

        let a = Frame::from_rgb(rgb).to_gray();
        let b = Frame::new(bgr, ChannelOrder::Bgr).to_gray();

        assert_eq!((a.width(), a.height()), (3, 2));
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_uniform_detection() {
        let blank = GrayFrame::new(GrayImage::from_pixel(8, 8, image::Luma([77])));
        assert!(blank.is_uniform());

        let mut textured = GrayImage::from_pixel(8, 8, image::Luma([77]));
        textured.put_pixel(3, 3, image::Luma([78]));
        assert!(!GrayFrame::new(textured).is_uniform());
    }

    #[test]
    fn test_still_source_yields_once() {
        let mut source = StillSource::new(Frame::from_rgb(RgbImage::new(4, 4)));
        assert_eq!(source.dimensions(), Some((4, 4)));
        assert!(source.next_frame().is_ok());
        assert!(matches!(source.next_frame(), Err(SmileyError::Capture(_))));
    }
}
