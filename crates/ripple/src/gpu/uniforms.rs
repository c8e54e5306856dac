use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::kernels::{cover_scale, CompositeParams};
use crate::pointer::Impulse;

/// `DropParams` block in the drop kernel.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct DropUniforms {
    pub center: [f32; 2],
    pub radius: f32,
    pub strength: f32,
    pub aspect: f32,
    pub _padding: [f32; 3],
}

unsafe impl Zeroable for DropUniforms {}
unsafe impl Pod for DropUniforms {}

impl DropUniforms {
    pub fn new(impulse: &Impulse, aspect: f32) -> Self {
        Self {
            center: [impulse.x, impulse.y],
            radius: impulse.radius,
            strength: impulse.strength,
            aspect,
            _padding: [0.0; 3],
        }
    }
}

/// `WaveParams` block in the wave kernel.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct WaveUniforms {
    pub damping: f32,
    pub _padding: [f32; 3],
}

unsafe impl Zeroable for WaveUniforms {}
unsafe impl Pod for WaveUniforms {}

impl WaveUniforms {
    pub fn new(damping: f32) -> Self {
        Self {
            damping,
            _padding: [0.0; 3],
        }
    }
}

/// `CompositeParams` block in the composite kernel.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct CompositeUniforms {
    pub scale: [f32; 2],
    pub ripple_strength: f32,
    pub mirror: f32,
    pub texel: f32,
    pub _padding: [f32; 3],
}

unsafe impl Zeroable for CompositeUniforms {}
unsafe impl Pod for CompositeUniforms {}

impl CompositeUniforms {
    pub fn new(params: &CompositeParams, field_resolution: u32) -> Self {
        Self {
            scale: cover_scale(params.canvas_aspect, params.video_aspect),
            ripple_strength: params.ripple_strength,
            mirror: if params.mirror { 1.0 } else { 0.0 },
            texel: 1.0 / field_resolution.max(1) as f32,
            _padding: [0.0; 3],
        }
    }
}

/// Uniform buffer plus its bind group for one stage.
pub(crate) struct UniformSlot {
    buffer: wgpu::Buffer,
    size: u64,
    pub bind_group: wgpu::BindGroup,
}

impl UniformSlot {
    pub fn new<T: Pod>(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, label: &str) -> Self {
        let size = std::mem::size_of::<T>() as u64;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self {
            buffer,
            size,
            bind_group,
        }
    }

    /// Records the upload on `encoder` via a staging buffer, so several passes
    /// in one submission each observe their own values.
    pub fn stage<T: Pod>(&self, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder, value: &T) {
        let staging = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("uniform staging"),
            contents: bytemuck::bytes_of(value),
            usage: wgpu::BufferUsages::COPY_SRC,
        });
        encoder.copy_buffer_to_buffer(&staging, 0, &self.buffer, 0, self.size);
    }
}
