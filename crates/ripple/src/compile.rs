use std::borrow::Cow;

use wgpu::naga::ShaderStage;

use crate::error::InitError;

/// The three fragment programs the simulation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kernel {
    /// Adds one radial impulse to the height channel.
    Drop,
    /// One damped wave-equation step.
    Wave,
    /// Refracts the video through the height-field gradient.
    Composite,
}

impl Kernel {
    pub(crate) const ALL: [Kernel; 3] = [Kernel::Drop, Kernel::Wave, Kernel::Composite];

    pub(crate) fn label(self) -> &'static str {
        match self {
            Kernel::Drop => "drop",
            Kernel::Wave => "wave",
            Kernel::Composite => "composite",
        }
    }

    fn body(self) -> &'static str {
        match self {
            Kernel::Drop => DROP_BODY,
            Kernel::Wave => WAVE_BODY,
            Kernel::Composite => COMPOSITE_BODY,
        }
    }
}

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule, InitError> {
    checked_module(device, "vertex", Cow::Borrowed(VERTEX_SHADER_GLSL), ShaderStage::Vertex)
}

/// Compiles one kernel; GLSL front-end or validation errors come back as
/// [`InitError::Shader`] instead of a device-lost panic.
pub(crate) fn compile_kernel(
    device: &wgpu::Device,
    kernel: Kernel,
) -> Result<wgpu::ShaderModule, InitError> {
    checked_module(
        device,
        kernel.label(),
        Cow::Owned(kernel_source(kernel)),
        ShaderStage::Fragment,
    )
}

fn checked_module(
    device: &wgpu::Device,
    stage: &'static str,
    shader: Cow<'static, str>,
    shader_stage: ShaderStage,
) -> Result<wgpu::ShaderModule, InitError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(stage),
        source: wgpu::ShaderSource::Glsl {
            shader,
            stage: shader_stage,
            defines: &[],
        },
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(InitError::Shader {
            stage,
            message: err.to_string(),
        }),
        None => Ok(module),
    }
}

/// Full GLSL source of a kernel: shared prologue followed by its body.
pub(crate) fn kernel_source(kernel: Kernel) -> String {
    format!("{HEADER}\n{}", kernel.body())
}

/// Shared prologue.
///
/// `v_uv` is output space (origin bottom-left); textures are addressed with
/// the origin top-left, hence `field_uv`. Group 1 is always the height field
/// being read.
const HEADER: &str = r"#version 450
layout(location = 0) in vec2 v_uv;

layout(set = 1, binding = 0) uniform texture2D field_texture;
layout(set = 1, binding = 1) uniform sampler field_sampler;

const float PI = 3.14159265358979;

vec2 field_uv(vec2 p) {
    return vec2(p.x, 1.0 - p.y);
}

vec4 field_texel(ivec2 texel) {
    ivec2 last = textureSize(sampler2D(field_texture, field_sampler), 0) - ivec2(1);
    return texelFetch(sampler2D(field_texture, field_sampler), clamp(texel, ivec2(0), last), 0);
}
";

/// Layout must match `DropUniforms` in `gpu/uniforms.rs`.
const DROP_BODY: &str = r"layout(location = 0) out vec4 out_field;

layout(std140, set = 0, binding = 0) uniform DropParams {
    vec2 center;
    float radius;
    float strength;
    float aspect;
    float _pad0;
    float _pad1;
    float _pad2;
} params;

void main() {
    vec4 texel = field_texel(ivec2(gl_FragCoord.xy));
    vec2 delta = v_uv - params.center;
    delta.x *= params.aspect;
    float dist = length(delta);
    float bump = 0.0;
    if (dist < params.radius) {
        bump = 0.5 - 0.5 * cos(PI * (1.0 - dist / params.radius));
    }
    texel.r += bump * params.strength;
    out_field = texel;
}
";

/// Layout must match `WaveUniforms` in `gpu/uniforms.rs`.
const WAVE_BODY: &str = r"layout(location = 0) out vec4 out_field;

layout(std140, set = 0, binding = 0) uniform WaveParams {
    float damping;
    float _pad0;
    float _pad1;
    float _pad2;
} params;

void main() {
    ivec2 texel = ivec2(gl_FragCoord.xy);
    vec4 here = field_texel(texel);
    float north = field_texel(texel + ivec2(0, -1)).r;
    float south = field_texel(texel + ivec2(0, 1)).r;
    float east = field_texel(texel + ivec2(1, 0)).r;
    float west = field_texel(texel + ivec2(-1, 0)).r;
    float next = params.damping * ((north + south + east + west) * 0.5 - here.g);
    out_field = vec4(next, here.r, 0.0, 1.0);
}
";

/// Layout must match `CompositeUniforms` in `gpu/uniforms.rs`.
const COMPOSITE_BODY: &str = r"layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform CompositeParams {
    vec2 scale;
    float ripple_strength;
    float mirror;
    float texel;
    float _pad0;
    float _pad1;
    float _pad2;
} params;

layout(set = 2, binding = 0) uniform texture2D video_texture;
layout(set = 2, binding = 1) uniform sampler video_sampler;

float height_at(vec2 p) {
    return texture(sampler2D(field_texture, field_sampler), field_uv(p)).r;
}

void main() {
    vec2 video = (v_uv - vec2(0.5)) * params.scale + vec2(0.5);
    if (params.mirror > 0.5) {
        video.x = 1.0 - video.x;
    }
    video.y = 1.0 - video.y;

    vec2 coord;
    if (any(lessThan(video, vec2(0.0))) || any(greaterThan(video, vec2(1.0)))) {
        coord = clamp(video, vec2(0.0), vec2(1.0));
    } else {
        float t = params.texel;
        float right = height_at(v_uv + vec2(t, 0.0));
        float left = height_at(v_uv - vec2(t, 0.0));
        float up = height_at(v_uv + vec2(0.0, t));
        float down = height_at(v_uv - vec2(0.0, t));
        vec2 offset = vec2(right - left, -(up - down));
        coord = clamp(video + offset * params.ripple_strength, vec2(0.0), vec2(1.0));
    }
    vec4 color = texture(sampler2D(video_texture, video_sampler), coord);
    out_color = vec4(color.rgb, 1.0);
}
";

/// Minimal full-screen triangle vertex shader.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::naga::front::glsl::{Frontend, Options};
    use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};

    fn parse_and_validate(label: &str, source: &str, stage: ShaderStage) {
        let module = Frontend::default()
            .parse(&Options::from(stage), source)
            .unwrap_or_else(|err| panic!("{label} failed to parse: {err:?}"));
        Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .unwrap_or_else(|err| panic!("{label} failed validation: {err:?}"));
    }

    #[test]
    fn kernels_parse_and_validate() {
        for kernel in Kernel::ALL {
            parse_and_validate(kernel.label(), &kernel_source(kernel), ShaderStage::Fragment);
        }
    }

    #[test]
    fn vertex_shader_parses_and_validates() {
        parse_and_validate("vertex", VERTEX_SHADER_GLSL, ShaderStage::Vertex);
    }

    #[test]
    fn every_kernel_has_a_single_version_directive_and_entry_point() {
        for kernel in Kernel::ALL {
            let source = kernel_source(kernel);
            assert!(source.starts_with("#version 450"), "{}", kernel.label());
            assert_eq!(source.matches("#version").count(), 1);
            assert_eq!(source.matches("void main()").count(), 1);
        }
    }

    #[test]
    fn field_writers_keep_both_channels() {
        let drop = kernel_source(Kernel::Drop);
        assert!(drop.contains("texel.r += bump * params.strength"));
        assert!(!drop.contains("texel.g +="));

        let wave = kernel_source(Kernel::Wave);
        assert!(wave.contains("out_field = vec4(next, here.r, 0.0, 1.0)"));
    }

    #[test]
    fn only_composite_reads_video() {
        for kernel in Kernel::ALL {
            let reads_video = kernel_source(kernel).contains("video_texture");
            assert_eq!(reads_video, kernel == Kernel::Composite);
        }
    }
}
