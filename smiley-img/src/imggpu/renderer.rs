use super::gpu::GpuExecutor;
use super::recorder::{Draw, DrawRecorder, Layer, RenderState};
use super::texture::{VideoTexture, rgba_texture, texture_bind_group};
use super::util::align_to;
use super::vertex::Vertex;
use crate::error::{Resource, Result, SmileyError};
use crate::frame::Frame;
use crate::transform::RenderTransform;
use image::RgbaImage;
use tracing::{Level, debug, span, trace};
use wgpu::util::DeviceExt;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.2,
    g: 0.2,
    b: 0.2,
    a: 0.,
};

const MATRIX_SIZE: u64 = std::mem::size_of::<[f32; 16]>() as u64;

/// One uniform buffer holding an MVP matrix per draw, bound with a dynamic
/// offset. Grows when a frame has more draws than slots.
struct TransformSlots {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    stride: u64,
    capacity: usize,
}

impl TransformSlots {
    fn new(gpu: &GpuExecutor, layout: &wgpu::BindGroupLayout, capacity: usize) -> Self {
        let alignment = gpu.device.limits().min_uniform_buffer_offset_alignment as u64;
        let stride = align_to(MATRIX_SIZE, alignment);

        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("transform_slots"),
            size: stride * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("transform_bind_group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(MATRIX_SIZE),
                }),
            }],
        });

        Self {
            buffer,
            bind_group,
            stride,
            capacity,
        }
    }

    fn write(&mut self, gpu: &GpuExecutor, layout: &wgpu::BindGroupLayout, draws: &[Draw]) {
        if draws.len() > self.capacity {
            let capacity = draws.len().next_power_of_two();
            debug!("Growing transform slots to {capacity}");
            *self = Self::new(gpu, layout, capacity);
        }

        let stride = self.stride as usize;
        let mut bytes = vec![0u8; stride * draws.len()];
        for (slot, draw) in bytes.chunks_exact_mut(stride).zip(draws) {
            let mvp: &[u8] = bytemuck::cast_slice(draw.mvp.as_slice());
            slot[..mvp.len()].copy_from_slice(mvp);
        }
        gpu.queue.write_buffer(&self.buffer, 0, &bytes);
    }

    fn offset(&self, index: usize) -> u32 {
        (self.stride * index as u64) as u32
    }
}

/*
 * Draws the camera frame as a full-window background quad, then one
 * alpha-blended overlay quad per face on top of it. Calls are recorded by
 * a DrawRecorder and only hit the GPU in `render`, as a single pass.
 */
pub struct Renderer {
    background_pipeline: wgpu::RenderPipeline,
    overlay_pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
    transform_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    quad: wgpu::Buffer,
    slots: TransformSlots,
    video: VideoTexture,
    overlay: wgpu::BindGroup,
    depth: wgpu::TextureView,
    recorder: DrawRecorder,
}

impl Renderer {
    pub fn new(
        gpu: &GpuExecutor,
        format: wgpu::TextureFormat,
        overlay: &RgbaImage,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let span = span!(Level::DEBUG, "Renderer#new");
        let _guard = span.enter();

        let shader = gpu.checked(Resource::Shader, |device| {
            device.create_shader_module(wgpu::include_wgsl!("quad.wgsl"))
        })?;

        let texture_layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("texture bind group layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let transform_layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("transform bind group layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(MATRIX_SIZE),
                    },
                    count: None,
                }],
            });

        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: &[&texture_layout, &transform_layout],
                push_constant_ranges: &[],
            });

        let pipeline = |label: &str, blend: Option<wgpu::BlendState>, depth_write: bool| {
            gpu.checked(Resource::Shader, |device| {
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(label),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &shader,
                        entry_point: Some("vert_main"),
                        compilation_options: Default::default(),
                        buffers: &[Vertex::desc()],
                    },
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleStrip,
                        cull_mode: None,
                        ..Default::default()
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &shader,
                        entry_point: Some("frag_main"),
                        compilation_options: Default::default(),
                        targets: &[Some(wgpu::ColorTargetState {
                            format,
                            blend,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                    }),
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: DEPTH_FORMAT,
                        depth_write_enabled: depth_write,
                        depth_compare: wgpu::CompareFunction::LessEqual,
                        stencil: Default::default(),
                        bias: Default::default(),
                    }),
                    multisample: Default::default(),
                    multiview: None,
                    cache: None,
                })
            })
        };
        let background_pipeline = pipeline("background_pipeline", None, true)?;
        // overlays keep the depth buffer untouched so they never hide each other
        let overlay_pipeline = pipeline(
            "overlay_pipeline",
            Some(wgpu::BlendState::ALPHA_BLENDING),
            false,
        )?;

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("quad_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let quad = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad_vertices"),
                contents: bytemuck::cast_slice(&Vertex::quad()),
                usage: wgpu::BufferUsages::VERTEX,
            });

        if overlay.width() == 0 || overlay.height() == 0 {
            return Err(SmileyError::startup(Resource::Image, "overlay image is empty"));
        }
        let overlay_texture = rgba_texture(gpu, "overlay_texture", overlay);
        let overlay = texture_bind_group(
            gpu,
            "overlay_bind_group",
            &texture_layout,
            &overlay_texture,
            &sampler,
        );

        let slots = TransformSlots::new(gpu, &transform_layout, 16);
        let depth = Self::depth_view(gpu, width, height);

        Ok(Self {
            background_pipeline,
            overlay_pipeline,
            texture_layout,
            transform_layout,
            sampler,
            quad,
            slots,
            video: VideoTexture::new(),
            overlay,
            depth,
            recorder: DrawRecorder::new(width, height),
        })
    }

    fn depth_view(gpu: &GpuExecutor, width: u32, height: u32) -> wgpu::TextureView {
        gpu.device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("depth_texture"),
                size: wgpu::Extent3d {
                    width: width.max(1),
                    height: height.max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                view_formats: &[],
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            })
            .create_view(&Default::default())
    }

    /// Start a frame by uploading its pixels as the background texture.
    pub fn upload_video_frame(&mut self, gpu: &GpuExecutor, frame: &Frame) -> Result<()> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(SmileyError::Capture("received an empty frame".into()));
        }
        self.recorder.begin_frame()?;
        self.video
            .upload(gpu, &self.texture_layout, &self.sampler, frame);
        Ok(())
    }

    pub fn draw_background(&mut self) -> Result<()> {
        self.recorder.background()
    }

    pub fn draw_overlay(&mut self, transform: &RenderTransform) -> Result<()> {
        trace!(
            "Overlay at ({:.3}, {:.3}) scaled ({:.3}, {:.3})",
            transform.translate_x, transform.translate_y, transform.scale_x, transform.scale_y
        );
        self.recorder.overlay(transform)
    }

    /// Submit every draw recorded since the last upload to `target`.
    pub fn render(&mut self, gpu: &GpuExecutor, target: &wgpu::TextureView) -> Result<()> {
        let span = span!(Level::DEBUG, "Renderer#render");
        let _guard = span.enter();

        let draws = self.recorder.finish()?.to_vec();
        let video = self.video.bind_group().ok_or(SmileyError::RenderState {
            action: "present",
            state: "no video frame uploaded".into(),
        })?;
        self.slots.write(gpu, &self.transform_layout, &draws);

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render_encoder"),
            });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("render_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });

        let (width, height) = self.recorder.viewport();
        render_pass.set_viewport(0., 0., width as f32, height as f32, 0., 1.);
        render_pass.set_vertex_buffer(0, self.quad.slice(..));

        for (i, draw) in draws.iter().enumerate() {
            match draw.layer {
                Layer::Background => {
                    render_pass.set_pipeline(&self.background_pipeline);
                    render_pass.set_bind_group(0, video, &[]);
                }
                Layer::Overlay => {
                    render_pass.set_pipeline(&self.overlay_pipeline);
                    render_pass.set_bind_group(0, &self.overlay, &[]);
                }
            }
            render_pass.set_bind_group(1, &self.slots.bind_group, &[self.slots.offset(i)]);
            render_pass.draw(0..4, 0..1);
        }
        drop(render_pass);

        gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Abandon the current frame without drawing it.
    pub fn discard_frame(&mut self) {
        self.recorder.discard();
    }

    pub fn resize(&mut self, gpu: &GpuExecutor, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        debug!("Resizing renderer to {width}x{height}");
        self.recorder.resize(width, height);
        self.depth = Self::depth_view(gpu, width, height);
    }

    pub fn video_texture_size(&self) -> Option<(u32, u32)> {
        self.video.size()
    }

    pub fn state(&self) -> RenderState {
        self.recorder.state()
    }

    pub fn recorder(&self) -> &DrawRecorder {
        &self.recorder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imggpu::surface::{OFFSCREEN_FORMAT, OffscreenSurface, RenderSurface};
    use crate::shapes::rect::FaceRegion;
    use crate::transform::TransformMapper;
    use image::{Rgb, RgbImage, Rgba};

    fn try_gpu() -> Option<GpuExecutor> {
        GpuExecutor::new().ok()
    }

    fn smiley(size: u32) -> RgbaImage {
        RgbaImage::from_pixel(size, size, Rgba([255, 220, 0, 255]))
    }

    #[test]
    fn test_upload_allocates_frame_sized_texture() {
        let gpu = match try_gpu() {
            Some(g) => g,
            None => return,
        };
        let mut renderer = Renderer::new(&gpu, OFFSCREEN_FORMAT, &smiley(8), 640, 480).unwrap();
        assert_eq!(renderer.video_texture_size(), None);

        let frame = Frame::from_rgb(RgbImage::new(320, 240));
        renderer.upload_video_frame(&gpu, &frame).unwrap();
        assert_eq!(renderer.video_texture_size(), Some((320, 240)));
        assert_eq!(renderer.state(), RenderState::UploadingFrame);

        renderer.discard_frame();
        let frame = Frame::from_rgb(RgbImage::new(160, 90));
        renderer.upload_video_frame(&gpu, &frame).unwrap();
        assert_eq!(renderer.video_texture_size(), Some((160, 90)));
    }

    #[test]
    fn test_empty_frame_rejected() {
        let gpu = match try_gpu() {
            Some(g) => g,
            None => return,
        };
        let mut renderer = Renderer::new(&gpu, OFFSCREEN_FORMAT, &smiley(8), 64, 64).unwrap();
        let frame = Frame::from_rgb(RgbImage::new(0, 0));
        assert!(renderer.upload_video_frame(&gpu, &frame).is_err());
        assert_eq!(renderer.state(), RenderState::Ready);
    }

    #[test]
    fn test_render_background_and_overlays() {
        let gpu = match try_gpu() {
            Some(g) => g,
            None => return,
        };
        let (width, height) = (64, 48);
        let mut target = OffscreenSurface::new(&gpu, width, height);
        let mut renderer =
            Renderer::new(&gpu, target.format(), &smiley(16), width, height).unwrap();

        let frame = Frame::from_rgb(RgbImage::from_pixel(width, height, Rgb([0, 0, 255])));
        renderer.upload_video_frame(&gpu, &frame).unwrap();
        renderer.draw_background().unwrap();

        // more faces than initial slots forces the uniform buffer to grow
        let mapper = TransformMapper::default();
        for _ in 0..20 {
            let region = FaceRegion::new(width / 2, height / 2, 48, 48);
            renderer
                .draw_overlay(&mapper.map(&region, width, height))
                .unwrap();
        }

        let acquired = target.acquire(&gpu).unwrap().unwrap();
        renderer.render(&gpu, acquired.view()).unwrap();
        acquired.present();
        assert_eq!(renderer.state(), RenderState::Presented);

        let pixels = target.read_pixels(&gpu).unwrap();
        assert_eq!(pixels.dimensions(), (width, height));
        // corner shows the background, centre is covered by the overlay
        let corner = pixels.get_pixel(0, 0);
        assert!(corner[2] > 200 && corner[0] < 50);
        let centre = pixels.get_pixel(width / 2, height / 2);
        assert!(centre[0] > 200 && centre[2] < 50);
    }
}
