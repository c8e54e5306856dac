use std::time::{Duration, Instant};

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::debug;
use winit::dpi::PhysicalSize;

use crate::driver::{Phase, Simulation, StageBackend, ViewportState};
use crate::error::InitError;
use crate::kernels::CompositeParams;
use crate::pointer::{Impulse, PointerInbox};
use crate::source::FrameSource;
use crate::types::{AdapterProfile, RendererConfig};

use super::context::GpuContext;
use super::field::{create_field_sampler, FieldTarget};
use super::pipeline::StagePipelines;
use super::uniforms::{CompositeUniforms, DropUniforms, UniformSlot, WaveUniforms};
use super::video::VideoTexture;

struct StageUniforms {
    drop: UniformSlot,
    wave: UniformSlot,
    composite: UniformSlot,
}

pub(crate) struct GpuState {
    context: GpuContext,
    pipelines: StagePipelines,
    uniforms: StageUniforms,
    video: VideoTexture,
    simulation: Simulation<FieldTarget>,
    source: Box<dyn FrameSource>,
    _field_sampler: wgpu::Sampler,
    last_stats: Instant,
    ticks_since_stats: u32,
    impulses_since_stats: usize,
}

impl GpuState {
    pub(crate) fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        config: &RendererConfig,
        source: Box<dyn FrameSource>,
    ) -> Result<Self, InitError>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let params = config.params;
        let context = GpuContext::new(
            target,
            initial_size,
            config.color_space,
            config.gpu_power,
            params.resolution,
        )?;
        let device = &context.device;
        let pipelines = StagePipelines::new(device, context.surface_format)?;
        let uniforms = StageUniforms {
            drop: UniformSlot::new::<DropUniforms>(device, &pipelines.uniform_layout, "drop uniforms"),
            wave: UniformSlot::new::<WaveUniforms>(device, &pipelines.uniform_layout, "wave uniforms"),
            composite: UniformSlot::new::<CompositeUniforms>(
                device,
                &pipelines.uniform_layout,
                "composite uniforms",
            ),
        };

        let field_sampler = create_field_sampler(device);
        let mut index = 0;
        let simulation = Simulation::initialise(
            params,
            ViewportState::new(context.size.width, context.size.height),
            |resolution| {
                index += 1;
                FieldTarget::new(
                    device,
                    &context.queue,
                    &pipelines.texture_layout,
                    &field_sampler,
                    resolution,
                    index - 1,
                )
            },
        )?;

        let video = VideoTexture::new(
            device,
            &context.queue,
            &pipelines.texture_layout,
            context.color_space,
        );
        debug!(
            source = %source.describe(),
            resolution = params.resolution,
            color_space = ?context.color_space,
            "ripple renderer ready"
        );

        Ok(Self {
            context,
            pipelines,
            uniforms,
            video,
            simulation,
            source,
            _field_sampler: field_sampler,
            last_stats: Instant::now(),
            ticks_since_stats: 0,
            impulses_since_stats: 0,
        })
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    pub(crate) fn adapter_profile(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    pub(crate) fn pointer(&self) -> PointerInbox {
        self.simulation.pointer()
    }

    pub(crate) fn phase(&self) -> Phase {
        self.simulation.phase()
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        if self.context.resize(new_size) {
            self.simulation.resize(new_size.width, new_size.height);
        }
    }

    pub(crate) fn reconfigure(&self) {
        self.context.reconfigure();
    }

    /// Stops the tick loop. GPU objects are released when `self` is dropped.
    pub(crate) fn dispose(&mut self) {
        self.simulation.dispose();
    }

    /// One display tick: refresh the video texture, run the simulation into
    /// the swapchain image and present it.
    pub(crate) fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        if self.simulation.phase() == Phase::Disposed {
            return Ok(());
        }

        if let Some(frame) = self.source.poll_frame() {
            self.video.upload(
                &self.context.device,
                &self.context.queue,
                &self.pipelines.texture_layout,
                &frame,
                self.context.adapter_profile.max_texture_dimension_2d,
            );
            if let Some((width, height)) = self.video.frame_size() {
                if self.simulation.set_video_size(width, height) {
                    debug!(width, height, "video size changed");
                }
            }
        }

        let frame = self.context.surface.get_current_texture()?;
        let mut view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ripple tick"),
            });

        let mut passes = GpuPasses {
            device: &self.context.device,
            encoder,
            pipelines: &self.pipelines,
            uniforms: &self.uniforms,
            video: &self.video.bind_group,
            resolution: self.simulation.params().resolution,
        };
        let report = self.simulation.tick(&mut passes, &mut view);
        let encoder = passes.encoder;
        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        self.record_stats(report.impulses);
        Ok(())
    }

    fn record_stats(&mut self, impulses: usize) {
        self.ticks_since_stats += 1;
        self.impulses_since_stats += impulses;
        let elapsed = self.last_stats.elapsed();
        if elapsed >= Duration::from_secs(1) {
            debug!(
                ticks_per_second = (self.ticks_since_stats as f32 / elapsed.as_secs_f32()).round(),
                impulses = self.impulses_since_stats,
                total_ticks = self.simulation.ticks(),
                "tick stats"
            );
            self.ticks_since_stats = 0;
            self.impulses_since_stats = 0;
            self.last_stats = Instant::now();
        }
    }
}

/// Records the stage passes of one tick into a single command encoder.
struct GpuPasses<'a> {
    device: &'a wgpu::Device,
    encoder: wgpu::CommandEncoder,
    pipelines: &'a StagePipelines,
    uniforms: &'a StageUniforms,
    video: &'a wgpu::BindGroup,
    resolution: u32,
}

impl GpuPasses<'_> {
    fn draw(
        &mut self,
        label: &str,
        target: &wgpu::TextureView,
        pipeline: &wgpu::RenderPipeline,
        bind_groups: &[&wgpu::BindGroup],
    ) {
        let mut render_pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(pipeline);
        for (index, group) in bind_groups.iter().enumerate() {
            render_pass.set_bind_group(index as u32, *group, &[]);
        }
        render_pass.draw(0..3, 0..1);
    }
}

impl StageBackend for GpuPasses<'_> {
    type Field = FieldTarget;
    type Output = wgpu::TextureView;

    fn inject(&mut self, source: &FieldTarget, target: &mut FieldTarget, impulse: &Impulse, aspect: f32) {
        let values = DropUniforms::new(impulse, aspect);
        self.uniforms.drop.stage(self.device, &mut self.encoder, &values);
        let (pipelines, uniforms) = (self.pipelines, self.uniforms);
        self.draw(
            "drop pass",
            &target.view,
            &pipelines.drop,
            &[&uniforms.drop.bind_group, &source.bind_group],
        );
    }

    fn propagate(&mut self, source: &FieldTarget, target: &mut FieldTarget, damping: f32) {
        let values = WaveUniforms::new(damping);
        self.uniforms.wave.stage(self.device, &mut self.encoder, &values);
        let (pipelines, uniforms) = (self.pipelines, self.uniforms);
        self.draw(
            "wave pass",
            &target.view,
            &pipelines.wave,
            &[&uniforms.wave.bind_group, &source.bind_group],
        );
    }

    fn composite(&mut self, field: &FieldTarget, output: &mut wgpu::TextureView, params: &CompositeParams) {
        let values = CompositeUniforms::new(params, self.resolution);
        self.uniforms.composite.stage(self.device, &mut self.encoder, &values);
        let (pipelines, uniforms, video) = (self.pipelines, self.uniforms, self.video);
        self.draw(
            "composite pass",
            output,
            &pipelines.composite,
            &[&uniforms.composite.bind_group, &field.bind_group, video],
        );
    }
}
