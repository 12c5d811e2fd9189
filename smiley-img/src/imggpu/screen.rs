use super::gpu::GpuExecutor;
use super::renderer::Renderer;
use super::surface::RenderSurface;
use crate::error::Result;
use crate::frame::Frame;
use crate::frame_loop::Compositor;
use crate::transform::RenderTransform;
use image::RgbaImage;
use tracing::{debug, warn};

/// GPU device, renderer and the surface it draws to.
pub struct Screen<S> {
    gpu: GpuExecutor,
    surface: S,
    renderer: Renderer,
}

impl<S: RenderSurface> Screen<S> {
    pub fn new(gpu: GpuExecutor, surface: S, overlay: &RgbaImage) -> Result<Self> {
        let (width, height) = surface.size();
        let renderer = Renderer::new(&gpu, surface.format(), overlay, width, height)?;
        Ok(Self {
            gpu,
            surface,
            renderer,
        })
    }

    pub fn gpu(&self) -> &GpuExecutor {
        &self.gpu
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }
}

impl<S: RenderSurface> Compositor for Screen<S> {
    fn upload_video_frame(&mut self, frame: &Frame) -> Result<()> {
        self.renderer.upload_video_frame(&self.gpu, frame)
    }

    fn draw_background(&mut self) -> Result<()> {
        self.renderer.draw_background()
    }

    fn draw_overlay(&mut self, transform: &RenderTransform) -> Result<()> {
        self.renderer.draw_overlay(transform)
    }

    fn present(&mut self) -> Result<()> {
        match self.surface.acquire(&self.gpu)? {
            Some(target) => {
                self.renderer.render(&self.gpu, target.view())?;
                target.present();
            }
            None => {
                warn!("Skipping frame, no surface texture");
                self.renderer.discard_frame();
            }
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            debug!("Ignoring resize to {width}x{height}");
            return;
        }
        self.surface.resize(&self.gpu, width, height);
        self.renderer.resize(&self.gpu, width, height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{GrayFrame, StillSource};
    use crate::frame_loop::FrameLoop;
    use crate::imggpu::recorder::RenderState;
    use crate::imggpu::surface::OffscreenSurface;
    use crate::pipeline::Detector;
    use crate::shapes::rect::FaceRegion;
    use image::{Rgb, RgbImage, Rgba};

    struct CentreFace;

    impl Detector for CentreFace {
        fn detect(&mut self, gray: &GrayFrame) -> Result<Vec<FaceRegion>> {
            Ok(vec![FaceRegion::new(gray.width() / 2, gray.height() / 2, 64, 64)])
        }
    }

    #[test]
    fn test_still_frame_composited_offscreen() {
        let gpu = match GpuExecutor::new() {
            Ok(g) => g,
            Err(_) => return,
        };
        let (width, height) = (96, 64);
        let surface = OffscreenSurface::new(&gpu, width, height);
        let overlay = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        let screen = Screen::new(gpu, surface, &overlay).unwrap();

        let input = Frame::from_rgb(RgbImage::from_pixel(width, height, Rgb([0, 255, 0])));
        let mut fl = FrameLoop::new(StillSource::new(input), CentreFace, screen);
        assert_eq!(fl.iterate().unwrap(), 1);

        let (_, _, screen) = fl.into_parts();
        assert_eq!(screen.renderer().state(), RenderState::Presented);
        let pixels = screen.surface().read_pixels(screen.gpu()).unwrap();
        assert_eq!(pixels.get_pixel(0, 0)[1], 255);
        assert_eq!(pixels.get_pixel(width / 2, height / 2)[0], 255);
    }

    #[test]
    fn test_resize_keeps_surface_and_renderer_in_step() {
        let gpu = match GpuExecutor::new() {
            Ok(g) => g,
            Err(_) => return,
        };
        let surface = OffscreenSurface::new(&gpu, 64, 48);
        let overlay = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        let mut screen = Screen::new(gpu, surface, &overlay).unwrap();

        screen.resize(200, 100);
        assert_eq!(screen.surface().size(), (200, 100));
        assert_eq!(screen.renderer().recorder().viewport(), (200, 100));

        screen.resize(0, 0);
        assert_eq!(screen.surface().size(), (200, 100));
    }
}
