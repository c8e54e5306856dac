use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::TextureFormatFeatureFlags;
use winit::dpi::PhysicalSize;

use crate::error::InitError;
use crate::types::{AdapterProfile, ColorSpaceMode, GpuPowerPreference};

use super::field::FIELD_FORMAT;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SurfaceColorSpace {
    Gamma,
    Linear,
}

impl SurfaceColorSpace {
    /// Video texels are uploaded as sRGB only when the swapchain re-encodes.
    pub(crate) fn video_format(self) -> wgpu::TextureFormat {
        match self {
            SurfaceColorSpace::Gamma => wgpu::TextureFormat::Rgba8Unorm,
            SurfaceColorSpace::Linear => wgpu::TextureFormat::Rgba8UnormSrgb,
        }
    }
}

pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
    pub surface_format: wgpu::TextureFormat,
    pub color_space: SurfaceColorSpace,
    pub adapter_profile: AdapterProfile,
}

impl GpuContext {
    pub(crate) fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        color_space: ColorSpaceMode,
        gpu_power: GpuPowerPreference,
        field_resolution: u32,
    ) -> Result<Self, InitError>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let window_handle = target
            .window_handle()
            .map_err(|err| InitError::Surface(format!("failed to acquire window handle: {err}")))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| InitError::Surface(format!("failed to acquire display handle: {err}")))?;

        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .map_err(|err| InitError::Surface(err.to_string()))?;

        let power_preference = match gpu_power {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|err| InitError::Adapter(err.to_string()))?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();
        let adapter_profile = AdapterProfile::from_wgpu(&adapter_info, &limits);
        tracing::debug!(
            name = %adapter_profile.name,
            backend = ?adapter_profile.backend,
            device_type = ?adapter_profile.device_type,
            is_software = adapter_profile.is_software(),
            "selected GPU adapter"
        );

        let max_dimension = limits.max_texture_dimension_2d;
        if field_resolution > max_dimension {
            return Err(InitError::Unsupported(format!(
                "GPU max texture dimension is {max_dimension}, height field needs {field_resolution}"
            )));
        }
        let requested_width = initial_size.width.max(1);
        let requested_height = initial_size.height.max(1);
        if requested_width > max_dimension || requested_height > max_dimension {
            return Err(InitError::Unsupported(format!(
                "GPU max texture dimension is {max_dimension}, requested surface is {requested_width}x{requested_height}"
            )));
        }

        let field_features = adapter.get_texture_format_features(FIELD_FORMAT);
        if !field_features
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
            || !field_features
                .flags
                .contains(TextureFormatFeatureFlags::FILTERABLE)
        {
            return Err(InitError::Unsupported(format!(
                "{FIELD_FORMAT:?} must be renderable and filterable"
            )));
        }

        let surface_caps = surface.get_capabilities(&adapter);
        let Some(&first_format) = surface_caps.formats.first() else {
            return Err(InitError::Surface(
                "surface is incompatible with the selected adapter".to_string(),
            ));
        };
        let color_space = match color_space {
            ColorSpaceMode::Auto | ColorSpaceMode::Gamma => SurfaceColorSpace::Gamma,
            ColorSpaceMode::Linear => SurfaceColorSpace::Linear,
        };
        let wants_srgb = color_space == SurfaceColorSpace::Linear;
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb() == wants_srgb)
            .unwrap_or_else(|| {
                tracing::warn!(
                    fallback = ?first_format,
                    ?color_space,
                    "no matching surface format available; falling back"
                );
                first_format
            });
        // The surface decides whether sRGB re-encoding actually happens.
        let color_space = if surface_format.is_srgb() {
            SurfaceColorSpace::Linear
        } else {
            SurfaceColorSpace::Gamma
        };

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("ripple device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| InitError::Device(err.to_string()))?;

        // FIFO presents once per vertical refresh, which paces the tick loop.
        let present_mode = surface_caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .or_else(|| surface_caps.present_modes.first().copied())
            .unwrap_or(wgpu::PresentMode::Fifo);
        tracing::debug!(?present_mode, ?surface_format, "configuring surface");

        let size = PhysicalSize::new(requested_width, requested_height);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            _instance: instance,
            surface,
            device,
            queue,
            config,
            size,
            surface_format,
            color_space,
            adapter_profile,
        })
    }

    /// Applies `new_size` to the surface. Returns `false` when the size was
    /// rejected and the previous configuration kept.
    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) -> bool {
        if new_size.width == 0 || new_size.height == 0 {
            return false;
        }

        let max_dimension = self.adapter_profile.max_texture_dimension_2d;
        if !fits_texture_limit(new_size, max_dimension) {
            tracing::warn!(
                new_width = new_size.width,
                new_height = new_size.height,
                max_dimension,
                old_width = self.size.width,
                old_height = self.size.height,
                "requested resize exceeds GPU limits; keeping previous size"
            );
            return false;
        }

        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.reconfigure();
        true
    }

    /// Re-applies the current configuration after a lost or outdated surface.
    pub(crate) fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }
}

fn fits_texture_limit(size: PhysicalSize<u32>, max_dimension: u32) -> bool {
    size.width <= max_dimension && size.height <= max_dimension
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_sizes_above_the_texture_limit_are_rejected() {
        assert!(fits_texture_limit(PhysicalSize::new(1920, 1080), 8192));
        assert!(fits_texture_limit(PhysicalSize::new(8192, 8192), 8192));
        assert!(!fits_texture_limit(PhysicalSize::new(8193, 1080), 8192));
        assert!(!fits_texture_limit(PhysicalSize::new(1920, 16384), 8192));
    }

    #[test]
    fn video_format_follows_surface_encoding() {
        assert_eq!(
            SurfaceColorSpace::Gamma.video_format(),
            wgpu::TextureFormat::Rgba8Unorm
        );
        assert_eq!(
            SurfaceColorSpace::Linear.video_format(),
            wgpu::TextureFormat::Rgba8UnormSrgb
        );
    }
}
