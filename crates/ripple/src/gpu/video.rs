use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::source::VideoFrame;

use super::context::SurfaceColorSpace;

/// The most recent video frame on the GPU.
///
/// Starts as a 1×1 black placeholder so compositing can run before the
/// source delivers anything.
pub(crate) struct VideoTexture {
    texture: wgpu::Texture,
    pub bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    received_frame: bool,
}

impl VideoTexture {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        color_space: SurfaceColorSpace,
    ) -> Self {
        let format = color_space.video_format();
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("video sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let texture = device.create_texture_with_data(
            queue,
            &descriptor(format, 1, 1),
            TextureDataOrder::LayerMajor,
            &[0, 0, 0, 255],
        );
        let bind_group = bind(device, layout, &texture, &sampler);
        Self {
            texture,
            bind_group,
            sampler,
            format,
            width: 1,
            height: 1,
            received_frame: false,
        }
    }

    /// Frame dimensions once a real frame arrived.
    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.received_frame.then_some((self.width, self.height))
    }

    /// Uploads `frame`, re-allocating when its size differs from the current
    /// texture. Frames larger than `max_dimension` are downscaled first.
    /// Returns `true` when the texture was re-allocated.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        frame: &VideoFrame<'_>,
        max_dimension: u32,
    ) -> bool {
        if !frame.is_complete() {
            tracing::warn!(
                width = frame.width,
                height = frame.height,
                bytes = frame.pixels.len(),
                "ignoring truncated video frame"
            );
            return false;
        }

        let downscaled;
        let frame = match frame.downscaled(max_dimension) {
            Some(image) => {
                tracing::warn!(
                    width = frame.width,
                    height = frame.height,
                    max_dimension,
                    new_width = image.width(),
                    new_height = image.height(),
                    "video frame exceeds GPU limits; downscaling"
                );
                downscaled = image;
                VideoFrame::new(downscaled.width(), downscaled.height(), downscaled.as_raw())
            }
            None => *frame,
        };

        let reallocated = frame.width != self.width || frame.height != self.height;
        if reallocated {
            device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
            device.push_error_scope(wgpu::ErrorFilter::Validation);
            let texture = device.create_texture(&descriptor(self.format, frame.width, frame.height));
            let validation = pollster::block_on(device.pop_error_scope());
            let out_of_memory = pollster::block_on(device.pop_error_scope());
            if let Some(err) = validation.or(out_of_memory) {
                tracing::warn!(
                    width = frame.width,
                    height = frame.height,
                    error = %err,
                    "failed to allocate video texture; keeping previous frame"
                );
                return false;
            }
            self.texture = texture;
            self.bind_group = bind(device, layout, &self.texture, &self.sampler);
            self.width = frame.width;
            self.height = frame.height;
            tracing::debug!(width = frame.width, height = frame.height, "video texture resized");
        }

        let row_bytes = frame.stride() as usize;
        let len = row_bytes * frame.height as usize;
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.pixels[..len],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.stride()),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
        self.received_frame = true;
        reallocated
    }
}

fn descriptor(format: wgpu::TextureFormat, width: u32, height: u32) -> wgpu::TextureDescriptor<'static> {
    wgpu::TextureDescriptor {
        label: Some("video frame"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    }
}

fn bind(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    texture: &wgpu::Texture,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("video bind group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}
