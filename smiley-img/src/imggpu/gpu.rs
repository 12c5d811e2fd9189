use super::surface::PresentSurface;
use crate::error::{Resource, Result, SmileyError};
use pollster::FutureExt;
use tracing::{Level, info, span};

pub struct GpuExecutor {
    pub queue: wgpu::Queue,
    pub device: wgpu::Device,
    info: wgpu::AdapterInfo,
}

fn gpu_err(e: impl std::fmt::Display) -> SmileyError {
    SmileyError::startup(Resource::Gpu, e)
}

impl GpuExecutor {
    fn instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::from_build_config(),
            backend_options: wgpu::BackendOptions::default(),
        })
    }

    async fn init(
        instance: &wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<(Self, wgpu::Adapter)> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .map_err(gpu_err)?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::Performance,
                label: Some("device"),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(gpu_err)?;

        let info = adapter.get_info();
        info!("Using {} ({:?})", info.name, info.backend);

        Ok((
            Self {
                device,
                queue,
                info,
            },
            adapter,
        ))
    }

    /// Headless device, for offscreen rendering.
    pub fn new() -> Result<Self> {
        let span = span!(Level::DEBUG, "GpuExecutor#new");
        let _guard = span.enter();

        let instance = Self::instance();
        let (gpu, _) = Self::init(&instance, None).block_on()?;
        Ok(gpu)
    }

    /// Device able to present to `target`, plus the configured surface.
    pub fn with_surface(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<(Self, PresentSurface)> {
        let span = span!(Level::DEBUG, "GpuExecutor#with_surface");
        let _guard = span.enter();

        let instance = Self::instance();
        let surface = instance
            .create_surface(target)
            .map_err(|e| SmileyError::startup(Resource::Window, e))?;
        let (gpu, adapter) = Self::init(&instance, Some(&surface)).block_on()?;

        let surface = PresentSurface::configure(&gpu, &adapter, surface, width, height)?;
        Ok((gpu, surface))
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    /// Run `create` and turn any validation error it raises into a startup
    /// error for `resource` instead of a panic.
    pub fn checked<T>(&self, resource: Resource, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let created = create(&self.device);
        match self.device.pop_error_scope().block_on() {
            None => Ok(created),
            Some(e) => Err(SmileyError::startup(resource, e)),
        }
    }
}
