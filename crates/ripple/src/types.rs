use crate::pointer::ImpulseParams;
use crate::source::FrameSourceKind;

/// Edge length of the square height field, independent of the output surface.
pub const DEFAULT_RESOLUTION: u32 = 512;
/// Energy retained per propagation step.
pub const DEFAULT_DAMPING: f32 = 0.985;
/// Scale applied to the height-field gradient when displacing video samples.
pub const DEFAULT_RIPPLE_STRENGTH: f32 = 0.1;

/// Numeric parameters shared by every stage of one simulation instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParams {
    /// Height field edge length in texels.
    pub resolution: u32,
    /// Damping factor in `(0, 1)`; higher values ripple longer.
    pub damping: f32,
    /// Impulse injected for continuous pointer movement.
    pub hover: ImpulseParams,
    /// Impulse injected for a discrete press.
    pub press: ImpulseParams,
    /// Displacement scale used by compositing.
    pub ripple_strength: f32,
    /// Mirror the video horizontally (front-facing camera behaviour).
    pub mirror: bool,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            damping: DEFAULT_DAMPING,
            hover: ImpulseParams::HOVER,
            press: ImpulseParams::PRESS,
            ripple_strength: DEFAULT_RIPPLE_STRENGTH,
            mirror: true,
        }
    }
}

/// Output color handling for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpaceMode {
    /// Pass camera bytes straight through (gamma-encoded swapchain).
    #[default]
    Auto,
    /// Treat video texels as gamma-encoded; use non-sRGB surfaces.
    Gamma,
    /// Decode video texels to linear and let an sRGB swapchain re-encode them.
    Linear,
}

/// Adapter power preference forwarded to wgpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

/// Summary of the adapter wgpu picked, kept for logging and heuristics.
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_texture_dimension_2d: u32,
}

impl AdapterProfile {
    pub fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
        }
    }

    /// True for CPU rasterisers such as llvmpipe or WARP.
    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
            || self.name.to_ascii_lowercase().contains("llvmpipe")
    }
}

/// Immutable configuration passed to the runtime at start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Window title.
    pub title: String,
    /// Simulation and compositing constants.
    pub params: SimulationParams,
    /// Where video frames come from.
    pub source: FrameSourceKind,
    /// Desired color handling for swapchain/textures.
    pub color_space: ColorSpaceMode,
    /// Adapter power preference.
    pub gpu_power: GpuPowerPreference,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            title: "ripplecam".to_string(),
            params: SimulationParams::default(),
            source: FrameSourceKind::default(),
            color_space: ColorSpaceMode::default(),
            gpu_power: GpuPowerPreference::default(),
        }
    }
}
