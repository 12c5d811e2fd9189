use super::gpu::GpuExecutor;
use super::util::padded_bytes_per_row;
use crate::error::{Resource, Result, SmileyError};
use image::RgbaImage;
use tracing::{Level, info, span, warn};

pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// One acquired render target. Presenting hands it back to the display.
pub struct SurfaceFrame {
    view: wgpu::TextureView,
    output: Option<wgpu::SurfaceTexture>,
}

impl SurfaceFrame {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn present(self) {
        if let Some(output) = self.output {
            output.present();
        }
    }
}

pub trait RenderSurface {
    fn format(&self) -> wgpu::TextureFormat;

    fn size(&self) -> (u32, u32);

    fn resize(&mut self, gpu: &GpuExecutor, width: u32, height: u32);

    /// `None` when this frame should be skipped.
    fn acquire(&mut self, gpu: &GpuExecutor) -> Result<Option<SurfaceFrame>>;
}

/// Window-backed swapchain. Presentation waits for vsync.
pub struct PresentSurface {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

impl PresentSurface {
    pub(crate) fn configure(
        gpu: &GpuExecutor,
        adapter: &wgpu::Adapter,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let caps = surface.get_capabilities(adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| SmileyError::startup(Resource::Window, "surface supports no formats"))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);
        info!("Surface configured as {format:?} at {width}x{height}");

        Ok(Self { surface, config })
    }
}

impl RenderSurface for PresentSurface {
    fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn resize(&mut self, gpu: &GpuExecutor, width: u32, height: u32) {
        // minimized windows report 0x0
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&gpu.device, &self.config);
    }

    fn acquire(&mut self, gpu: &GpuExecutor) -> Result<Option<SurfaceFrame>> {
        match self.surface.get_current_texture() {
            Ok(output) => {
                let view = output.texture.create_view(&Default::default());
                Ok(Some(SurfaceFrame {
                    view,
                    output: Some(output),
                }))
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("Surface out of date, reconfiguring");
                self.surface.configure(&gpu.device, &self.config);
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("Timed out waiting for surface texture");
                Ok(None)
            }
            Err(e) => Err(SmileyError::Gpu(e.to_string())),
        }
    }
}

/// Texture-backed target that can be read back to the CPU.
pub struct OffscreenSurface {
    texture: wgpu::Texture,
}

impl OffscreenSurface {
    pub fn new(gpu: &GpuExecutor, width: u32, height: u32) -> Self {
        Self {
            texture: Self::create_texture(gpu, width, height),
        }
    }

    fn create_texture(gpu: &GpuExecutor, width: u32, height: u32) -> wgpu::Texture {
        gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen_target"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            view_formats: &[OFFSCREEN_FORMAT],
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        })
    }

    pub fn read_pixels(&self, gpu: &GpuExecutor) -> Result<RgbaImage> {
        let span = span!(Level::DEBUG, "read_pixels");
        let _guard = span.enter();

        let width = self.texture.width();
        let height = self.texture.height();

        let padded_bytes_per_row = padded_bytes_per_row(width);
        let unpadded_bytes_per_row = width as usize * 4;

        let buffer_size = padded_bytes_per_row as u64 * height as u64;
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("snapshot_buffer"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("encoder"),
            });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row as u32),
                    rows_per_image: Some(height),
                },
            },
            self.texture.size(),
        );

        gpu.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = buffer.slice(..);
        buffer_slice.map_async(wgpu::MapMode::Read, |_| {});
        gpu.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| SmileyError::Gpu(e.to_string()))?;

        let padded_data = buffer_slice.get_mapped_range();
        let mut pixels: Vec<u8> = vec![0; unpadded_bytes_per_row * height as usize];
        for (padded, pixels) in padded_data
            .chunks_exact(padded_bytes_per_row)
            .zip(pixels.chunks_exact_mut(unpadded_bytes_per_row))
        {
            pixels.copy_from_slice(&padded[..unpadded_bytes_per_row]);
        }
        drop(padded_data);
        buffer.unmap();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| SmileyError::Gpu("readback size mismatch".into()))
    }
}

impl RenderSurface for OffscreenSurface {
    fn format(&self) -> wgpu::TextureFormat {
        OFFSCREEN_FORMAT
    }

    fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    fn resize(&mut self, gpu: &GpuExecutor, width: u32, height: u32) {
        if self.size() != (width.max(1), height.max(1)) {
            self.texture = Self::create_texture(gpu, width, height);
        }
    }

    fn acquire(&mut self, _gpu: &GpuExecutor) -> Result<Option<SurfaceFrame>> {
        Ok(Some(SurfaceFrame {
            view: self.texture.create_view(&Default::default()),
            output: None,
        }))
    }
}
