use super::gpu::GpuExecutor;
use crate::frame::Frame;
use image::RgbaImage;
use tracing::{Level, debug, span};

pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

fn create_texture(gpu: &GpuExecutor, label: &str, width: u32, height: u32) -> wgpu::Texture {
    gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TEXTURE_FORMAT,
        view_formats: &[TEXTURE_FORMAT],
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
    })
}

fn write_rgba(gpu: &GpuExecutor, texture: &wgpu::Texture, rgba_bytes: &[u8]) {
    gpu.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba_bytes,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(texture.width() * 4),
            rows_per_image: Some(texture.height()),
        },
        texture.size(),
    );
}

/// Immutable texture from a decoded image.
pub fn rgba_texture(gpu: &GpuExecutor, label: &str, img: &RgbaImage) -> wgpu::Texture {
    let span = span!(Level::DEBUG, "rgba_texture");
    let _guard = span.enter();

    let texture = create_texture(gpu, label, img.width(), img.height());
    write_rgba(gpu, &texture, img.as_raw());
    texture
}

pub fn texture_bind_group(
    gpu: &GpuExecutor,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    texture: &wgpu::Texture,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(
                    &texture.create_view(&Default::default()),
                ),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

/// Texture holding the live camera frame. Always sized like the last
/// uploaded frame; reallocated when the frame size changes.
pub struct VideoTexture {
    slot: Option<(wgpu::Texture, wgpu::BindGroup)>,
}

impl Default for VideoTexture {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoTexture {
    pub fn new() -> Self {
        Self { slot: None }
    }

    pub fn upload(
        &mut self,
        gpu: &GpuExecutor,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        frame: &Frame,
    ) {
        let span = span!(Level::DEBUG, "upload_video_frame");
        let _guard = span.enter();

        let (width, height) = frame.dimensions();
        if self.size() != Some((width, height)) {
            debug!("Allocating {width}x{height} video texture");
            let texture = create_texture(gpu, "video_texture", width, height);
            let bind_group = texture_bind_group(gpu, "video_bind_group", layout, &texture, sampler);
            self.slot = Some((texture, bind_group));
        }

        if let Some((texture, _)) = &self.slot {
            write_rgba(gpu, texture, frame.to_rgba().as_raw());
        }
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.slot.as_ref().map(|(t, _)| (t.width(), t.height()))
    }

    pub fn bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.slot.as_ref().map(|(_, bg)| bg)
    }
}
