use crate::compile::{compile_kernel, compile_vertex_shader, Kernel};
use crate::error::InitError;

use super::field::FIELD_FORMAT;

/// Layouts and the three render pipelines.
///
/// Group 0 is the stage's uniform block, group 1 the field being read and
/// group 2 (composite only) the video texture.
pub(crate) struct StagePipelines {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub texture_layout: wgpu::BindGroupLayout,
    pub drop: wgpu::RenderPipeline,
    pub wave: wgpu::RenderPipeline,
    pub composite: wgpu::RenderPipeline,
}

impl StagePipelines {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Result<Self, InitError> {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("stage uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sampled texture layout"),
            entries: &texture_layout_entries(),
        });

        let vertex_module = compile_vertex_shader(device)?;
        let field_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("field stage layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let composite_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("composite stage layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let drop = build_pipeline(device, &vertex_module, &field_layout, Kernel::Drop, FIELD_FORMAT)?;
        let wave = build_pipeline(device, &vertex_module, &field_layout, Kernel::Wave, FIELD_FORMAT)?;
        let composite = build_pipeline(
            device,
            &vertex_module,
            &composite_layout,
            Kernel::Composite,
            surface_format,
        )?;

        Ok(Self {
            uniform_layout,
            texture_layout,
            drop,
            wave,
            composite,
        })
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    vertex_module: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    kernel: Kernel,
    format: wgpu::TextureFormat,
) -> Result<wgpu::RenderPipeline, InitError> {
    let fragment_module = compile_kernel(device, kernel)?;

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(kernel.label()),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex_module,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: &fragment_module,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(InitError::Shader {
            stage: kernel.label(),
            message: err.to_string(),
        });
    }
    tracing::debug!(stage = kernel.label(), ?format, "built stage pipeline");
    Ok(pipeline)
}

fn texture_layout_entries() -> [wgpu::BindGroupLayoutEntry; 2] {
    [
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
    ]
}
